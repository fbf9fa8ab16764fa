//! Error model for the authorization core and its HTTP surfaces.
//!
//! `RbacError` is what the engine returns. `AppError` is the serde-tagged
//! shape handed to HTTP clients; every engine error maps onto exactly one
//! status code, and backing-store failures always map to a 5xx so callers
//! fail closed.

use axum::response::{IntoResponse, Response};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, thiserror::Error)]
pub enum RbacError {
    /// A role string does not decode to the shape its kind requires.
    #[error("malformed role `{role}`: {reason}")]
    MalformedRole { role: String, reason: String },

    #[error("backing store failure during {op}: {source}")]
    BackingStore {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt policy log {path} at offset {offset}: {reason}")]
    CorruptLog { path: String, offset: u64, reason: String },

    /// A failed append could not be rolled back; the log refuses writes
    /// until it is reopened.
    #[error("policy log {path} is poisoned by an unrecoverable append failure")]
    LogPoisoned { path: String },

    #[error("{field} is {len} bytes, longer than the {max} byte limit")]
    FieldTooLong { field: &'static str, len: usize, max: usize },

    #[error("unknown action `{0}`")]
    UnknownAction(String),

    #[error("unknown role `{0}`")]
    UnknownRole(String),

    #[error("invalid username `{0}`")]
    InvalidUsername(String),

    #[error("policy engine has not been initialized")]
    NotInitialized,
}

pub type RbacResult<T> = Result<T, RbacError>;

impl RbacError {
    pub(crate) fn malformed<S: Into<String>, R: Into<String>>(role: S, reason: R) -> Self {
        RbacError::MalformedRole { role: role.into(), reason: reason.into() }
    }

    pub(crate) fn store(op: &'static str, source: std::io::Error) -> Self {
        RbacError::BackingStore { op, source }
    }

    /// True for failures of the durable store itself. Callers deny on these.
    pub fn is_backing_store(&self) -> bool {
        matches!(self, RbacError::BackingStore { .. } | RbacError::CorruptLog { .. } | RbacError::LogPoisoned { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    Unauthenticated { code: String, message: String },
    Forbidden { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::Unauthenticated { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::Unauthenticated { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn unauthenticated<S: Into<String>>(code: S, msg: S) -> Self { AppError::Unauthenticated { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::Unauthenticated { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<RbacError> for AppError {
    fn from(err: RbacError) -> Self {
        match &err {
            RbacError::UnknownAction(_)
            | RbacError::UnknownRole(_)
            | RbacError::InvalidUsername(_)
            | RbacError::FieldTooLong { .. } => {
                AppError::UserInput { code: "bad_request".into(), message: err.to_string() }
            }
            // Malformed stored roles are data corruption, not user error.
            RbacError::MalformedRole { .. } => AppError::Internal { code: "malformed_role".into(), message: err.to_string() },
            RbacError::BackingStore { .. } | RbacError::CorruptLog { .. } | RbacError::LogPoisoned { .. } => {
                AppError::Internal { code: "policy_store".into(), message: "authorization backend unavailable".into() }
            }
            RbacError::NotInitialized => AppError::Internal { code: "not_initialized".into(), message: err.to_string() },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
