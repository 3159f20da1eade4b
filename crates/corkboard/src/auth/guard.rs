//! Role-based authorization stages.
//!
//! Guards read the [`Identity`] left by the authenticator; running one on a
//! request without an identity rejects it as unauthenticated.

use axum::{body::Body, http::Request};
use log::warn;

use super::{AuthError, Identity, Role};
use crate::pipeline::{Admitted, Rejection, RouteParams, Stage};

/// Authorization strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleGuard {
    /// Role must be one of the listed roles.
    AnyOf(Vec<Role>),
    /// Role level must be at least the given role's level.
    AtLeast(Role),
    /// Subject must own the resource named by a route parameter.
    Owner { param: String, admin_bypass: bool },
}

impl RoleGuard {
    pub fn require_roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self::AnyOf(roles.into_iter().collect())
    }

    pub fn require_admin() -> Self {
        Self::AnyOf(vec![Role::Admin])
    }

    pub fn require_teacher_or_admin() -> Self {
        Self::AnyOf(vec![Role::Teacher, Role::Admin])
    }

    pub fn require_min_role(minimum: Role) -> Self {
        Self::AtLeast(minimum)
    }

    /// Ownership check on `param`; admins pass regardless.
    pub fn require_ownership(param: impl Into<String>) -> Self {
        Self::Owner {
            param: param.into(),
            admin_bypass: true,
        }
    }

    /// Turn off the admin bypass of an ownership guard.
    pub fn without_admin_bypass(self) -> Self {
        match self {
            Self::Owner { param, .. } => Self::Owner {
                param,
                admin_bypass: false,
            },
            other => other,
        }
    }

    /// Decide whether `identity` may proceed.
    pub fn authorize(
        &self,
        identity: &Identity,
        params: Option<&RouteParams>,
    ) -> Result<(), AuthError> {
        match self {
            Self::AnyOf(roles) => {
                if roles.contains(&identity.role) {
                    Ok(())
                } else {
                    Err(AuthError::forbidden(any_of_message(roles)))
                }
            }
            Self::AtLeast(minimum) => {
                if identity.role.at_least(*minimum) {
                    Ok(())
                } else {
                    Err(AuthError::forbidden(format!(
                        "Requires {} role or higher",
                        minimum
                    )))
                }
            }
            Self::Owner {
                param,
                admin_bypass,
            } => {
                let owner = params.and_then(|params| params.get(param));
                if owner.is_none() {
                    warn!("ownership guard: route has no '{}' parameter", param);
                }

                let is_owner = owner == Some(identity.subject_id.as_str());
                if is_owner || (*admin_bypass && identity.is_admin()) {
                    Ok(())
                } else {
                    Err(AuthError::forbidden(
                        "Access denied: you can only access your own resources",
                    ))
                }
            }
        }
    }
}

fn any_of_message(roles: &[Role]) -> &'static str {
    let has = |role| roles.contains(&role);
    match roles.len() {
        1 if has(Role::Admin) => "Admin access required",
        2 if has(Role::Teacher) && has(Role::Admin) => "Teacher or admin access required",
        _ => "Insufficient permissions",
    }
}

impl Stage for RoleGuard {
    fn name(&self) -> &'static str {
        match self {
            Self::AnyOf(_) => "require_roles",
            Self::AtLeast(_) => "require_min_role",
            Self::Owner { .. } => "require_ownership",
        }
    }

    fn inspect(&self, req: &mut Request<Body>) -> Result<Admitted, Rejection> {
        let identity = req
            .extensions()
            .get::<Identity>()
            .ok_or(AuthError::MissingCredentials)?;

        self.authorize(identity, req.extensions().get::<RouteParams>())?;
        Ok(Admitted::pass())
    }
}
