//! Token claims and the role hierarchy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User role.
///
/// Roles are totally ordered by [`Role::level`]: `student < teacher < admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular member of the wall.
    Student,
    /// Moderator.
    Teacher,
    /// Administrator.
    Admin,
}

impl Role {
    /// Every role, lowest level first.
    pub const ALL: [Role; 3] = [Role::Student, Role::Teacher, Role::Admin];

    /// Numeric level used for hierarchical checks.
    pub const fn level(self) -> u8 {
        match self {
            Role::Student => 1,
            Role::Teacher => 2,
            Role::Admin => 3,
        }
    }

    /// Whether this role is at or above `minimum` in the hierarchy.
    pub const fn at_least(self, minimum: Role) -> bool {
        self.level() >= minimum.level()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    /// Role names are matched exactly; `"Admin"` is not a role.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| format!("unknown role: {}", s))
    }
}

/// JWT payload as it appears on the wire.
///
/// Every field is optional so that a signed but incomplete payload can be
/// told apart from a token that does not decode at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Role name. Kept as raw JSON so non-string values surface as an
    /// invalid role rather than a decode failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<serde_json::Value>,

    /// Issued at (as Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Expiration time (as Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl Claims {
    /// Build a complete payload for `subject` valid from `issued_at` until `expires_at`.
    pub fn new(subject: &str, role: Role, issued_at: i64, expires_at: i64) -> Self {
        Self {
            sub: Some(subject.to_string()),
            role: Some(serde_json::Value::String(role.to_string())),
            iat: Some(issued_at),
            exp: Some(expires_at),
        }
    }
}

/// A verified claim set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSet {
    pub subject_id: String,
    pub role: Role,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}
