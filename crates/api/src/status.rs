//! Mapping of [`AppError`] onto transport status codes and error bodies.

use serde::Serialize;

use warden_core::{AppError, AuthErrorKind, ErrorCategory, InternalKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Ok,
    InvalidArgument,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    Internal,
    Unavailable,
    Cancelled,
    DeadlineExceeded,
}

impl StatusCode {
    pub fn of(err: &AppError) -> Self {
        match err {
            AppError::Validation { .. } => StatusCode::InvalidArgument,
            AppError::Auth(kind) if kind.is_forbidden() => StatusCode::PermissionDenied,
            AppError::Auth(AuthErrorKind::AccountDisabled) => StatusCode::PermissionDenied,
            AppError::Auth(_) => StatusCode::Unauthenticated,
            AppError::NotFound(_) => StatusCode::NotFound,
            AppError::Conflict(_) => StatusCode::AlreadyExists,
            AppError::Business(_) => StatusCode::FailedPrecondition,
            AppError::Internal { kind, .. } => match kind {
                InternalKind::Cancelled => StatusCode::Cancelled,
                InternalKind::DeadlineExceeded => StatusCode::DeadlineExceeded,
                InternalKind::Unavailable => StatusCode::Unavailable,
                InternalKind::Unexpected => StatusCode::Internal,
            },
            AppError::PartialRollback(_) => StatusCode::Internal,
        }
    }
}

/// Error payload returned to callers.
///
/// Internal details are replaced by a generic message; the full error goes to
/// the log instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub status: StatusCode,
    pub code: &'static str,
    pub category: ErrorCategory,
    pub message: String,
}

impl From<&AppError> for ErrorBody {
    fn from(err: &AppError) -> Self {
        let category = err.category();
        let message = match category {
            ErrorCategory::Internal => {
                tracing::error!(code = err.code(), error = %err, "request failed");
                "internal error".to_string()
            }
            _ => err.to_string(),
        };
        Self {
            status: StatusCode::of(err),
            code: err.code(),
            category,
            message,
        }
    }
}
