//! Sequential request admission.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s. Each stage inspects the
//! request and either lets it through or rejects it; the first rejection
//! ends the request. Stages are synchronous: none of them waits on I/O.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{RawPathParams, State, rejection::RawPathParamsRejection},
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::debug;

use crate::admission::AdmissionError;
use crate::auth::AuthError;

/// Terminal rejection produced by a stage.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Admission(#[from] AdmissionError),
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        match self {
            Rejection::Auth(err) => err.into_response(),
            Rejection::Admission(err) => err.into_response(),
        }
    }
}

/// Outcome of a stage that let the request through.
#[derive(Debug, Default)]
pub struct Admitted {
    headers: HeaderMap,
}

impl Admitted {
    pub fn pass() -> Self {
        Self::default()
    }

    /// Pass, and add `headers` to the eventual response.
    pub fn with_headers(headers: HeaderMap) -> Self {
        Self { headers }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// One admission check.
pub trait Stage: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn inspect(&self, req: &mut Request<Body>) -> Result<Admitted, Rejection>;
}

/// Path parameters of the matched route, made available to stages.
#[derive(Debug, Clone, Default)]
pub struct RouteParams(HashMap<String, String>);

impl RouteParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

impl FromIterator<(String, String)> for RouteParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Ordered list of stages.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn stage<S: Stage + 'static>(self, stage: S) -> Self {
        self.shared(Arc::new(stage))
    }

    /// Append a stage that is shared with other pipelines.
    pub fn shared(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in execution order.
    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run every stage in order.
    ///
    /// Returns the headers collected from the stages that passed, or the
    /// first rejection. A header set by several stages keeps the last value.
    pub fn admit(&self, req: &mut Request<Body>) -> Result<HeaderMap, Rejection> {
        let mut headers = HeaderMap::new();
        for stage in &self.stages {
            match stage.inspect(req) {
                Ok(admitted) => headers.extend(admitted.headers),
                Err(rejection) => {
                    debug!(
                        stage = stage.name(),
                        method = %req.method(),
                        path = req.uri().path(),
                        reason = %rejection,
                        "request rejected"
                    );
                    return Err(rejection);
                }
            }
        }
        Ok(headers)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Axum middleware running a pipeline.
///
/// Install with `middleware::from_fn_with_state(pipeline, admit)`. When the
/// layer runs after routing, the matched path parameters are exposed to the
/// stages as [`RouteParams`].
pub async fn admit(
    State(pipeline): State<Pipeline>,
    params: Result<RawPathParams, RawPathParamsRejection>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Ok(params) = params {
        let params: RouteParams = params
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        req.extensions_mut().insert(params);
    }

    match pipeline.admit(&mut req) {
        Ok(headers) => {
            let mut response = next.run(req).await;
            // Inner pipelines ran later; their headers win.
            for (name, value) in &headers {
                if !response.headers().contains_key(name) {
                    response.headers_mut().insert(name.clone(), value.clone());
                }
            }
            response
        }
        Err(rejection) => rejection.into_response(),
    }
}
