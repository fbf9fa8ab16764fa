//! Per-request authorization layer.
//!
//! Runs inside each nested API surface, so the path it sees has the surface's
//! base path already stripped; that path is the resource handed to the
//! enforcer.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, error};

use super::AppState;
use crate::directory::normalize_username;
use crate::error::AppError;
use crate::rbac::Action;

/// Authenticated username, installed by the token layer in front of us or
/// derived from the trusted subject header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject(pub String);

impl Subject {
    pub fn as_str(&self) -> &str { &self.0 }
}

fn subject_from_header(headers: &HeaderMap, name: &str) -> Option<Subject> {
    let v = headers.get(name)?.to_str().ok()?.trim();
    if v.is_empty() { None } else { Some(Subject(v.to_string())) }
}

pub async fn authorize(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let subject = req
        .extensions()
        .get::<Subject>()
        .cloned()
        .or_else(|| subject_from_header(req.headers(), &state.subject_header));
    let Some(subject) = subject else {
        return AppError::unauthenticated("unauthenticated", "no authenticated user on request").into_response();
    };
    // A role name is never a user; evaluating it would act with whatever
    // that role inherits.
    if normalize_username(subject.as_str()).is_err() {
        debug!(target: "authz", user = subject.as_str(), "subject is not a valid username");
        return AppError::unauthenticated("unauthenticated", "subject is not a valid username").into_response();
    }

    let resource = req.uri().path().to_string();
    let action = Action::for_method(req.method());
    match state.enforcer.enforce(subject.as_str(), &resource, action) {
        Ok(true) => {
            req.extensions_mut().insert(subject);
            next.run(req).await
        }
        Ok(false) => {
            debug!(target: "authz", user = subject.as_str(), resource = %resource, action = %action, "denied");
            AppError::forbidden("forbidden", "not permitted").into_response()
        }
        Err(e) => {
            // Fail closed.
            error!(target: "authz", user = subject.as_str(), resource = %resource, error = %e, "enforcer failed");
            AppError::from(e).into_response()
        }
    }
}
