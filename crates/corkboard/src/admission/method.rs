//! HTTP verb admission.

use axum::{
    body::Body,
    http::{Method, Request},
};

use super::AdmissionError;
use crate::pipeline::{Admitted, Rejection, Stage};

/// Rejects every method outside a fixed set, whether or not a route exists
/// for the path.
#[derive(Debug, Clone)]
pub struct MethodGate {
    allowed: Vec<Method>,
}

impl MethodGate {
    /// Deployment default: GET, POST and HEAD, plus OPTIONS when cross-origin
    /// requests are enabled.
    pub fn for_deployment(cors_enabled: bool) -> Self {
        let mut allowed = vec![Method::GET, Method::POST, Method::HEAD];
        if cors_enabled {
            allowed.push(Method::OPTIONS);
        }
        Self { allowed }
    }

    pub fn allowed(&self) -> &[Method] {
        &self.allowed
    }

    pub fn check(&self, method: &Method) -> Result<(), AdmissionError> {
        if self.allowed.contains(method) {
            Ok(())
        } else {
            Err(AdmissionError::MethodNotAllowed {
                method: method.clone(),
                allowed: self.allowed.clone(),
            })
        }
    }
}

impl Stage for MethodGate {
    fn name(&self) -> &'static str {
        "method"
    }

    fn inspect(&self, req: &mut Request<Body>) -> Result<Admitted, Rejection> {
        self.check(req.method())?;
        Ok(Admitted::pass())
    }
}
