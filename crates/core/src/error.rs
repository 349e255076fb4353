//! Error taxonomy shared by every layer of the service.
//!
//! Every failure lands in exactly one [`ErrorCategory`]; transports translate the
//! category (plus the stable [`AppError::code`]) into their own status codes.

use serde::Serialize;
use thiserror::Error;

use crate::context::Interrupted;

/// Result type used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Coarse classification of a failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Auth,
    NotFound,
    Conflict,
    Business,
    Internal,
}

impl core::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Auth => "auth",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::Business => "business",
            ErrorCategory::Internal => "internal",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ValidationKind {
    /// A resource type or action outside the closed enumerations.
    InvalidType,
    /// Input that does not have the expected shape.
    InvalidFormat,
    InvalidId,
    MissingField,
    WeakPassword,
}

impl ValidationKind {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationKind::InvalidType => "VALIDATION_INVALID_TYPE",
            ValidationKind::InvalidFormat => "VALIDATION_INVALID_FORMAT",
            ValidationKind::InvalidId => "VALIDATION_INVALID_ID",
            ValidationKind::MissingField => "VALIDATION_MISSING_FIELD",
            ValidationKind::WeakPassword => "VALIDATION_WEAK_PASSWORD",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Error)]
pub enum AuthErrorKind {
    /// Unknown account and wrong password are deliberately the same error.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("token expired")]
    TokenExpired,
    #[error("token revoked")]
    TokenRevoked,
    #[error("token invalid")]
    TokenInvalid,
    #[error("permission denied")]
    PermissionDenied,
    #[error("tenant access denied")]
    TenantAccessDenied,
    #[error("account disabled")]
    AccountDisabled,
}

impl AuthErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            AuthErrorKind::InvalidCredentials => "AUTH_INVALID_CREDENTIALS",
            AuthErrorKind::TokenExpired => "AUTH_TOKEN_EXPIRED",
            AuthErrorKind::TokenRevoked => "AUTH_TOKEN_REVOKED",
            AuthErrorKind::TokenInvalid => "AUTH_TOKEN_INVALID",
            AuthErrorKind::PermissionDenied => "AUTH_PERMISSION_DENIED",
            AuthErrorKind::TenantAccessDenied => "AUTH_TENANT_ACCESS_DENIED",
            AuthErrorKind::AccountDisabled => "AUTH_ACCOUNT_DISABLED",
        }
    }

    /// Denials of an authenticated caller, as opposed to failed authentication.
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            AuthErrorKind::PermissionDenied | AuthErrorKind::TenantAccessDenied
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum InternalKind {
    /// A backing store could not be reached or refused the operation.
    Unavailable,
    Cancelled,
    DeadlineExceeded,
    Unexpected,
}

impl InternalKind {
    pub fn code(&self) -> &'static str {
        match self {
            InternalKind::Unavailable => "INTERNAL_UNAVAILABLE",
            InternalKind::Cancelled => "INTERNAL_CANCELLED",
            InternalKind::DeadlineExceeded => "INTERNAL_DEADLINE_EXCEEDED",
            InternalKind::Unexpected => "INTERNAL_UNEXPECTED",
        }
    }
}

/// Application-level error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("validation failed: {detail}")]
    Validation { kind: ValidationKind, detail: String },

    #[error("{0}")]
    Auth(AuthErrorKind),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("business rule violated: {0}")]
    Business(String),

    #[error("internal error: {detail}")]
    Internal { kind: InternalKind, detail: String },

    /// Several failures collected while undoing a multi-step operation.
    #[error("{} failure(s) during rollback: {}", .0.len(), join_messages(.0))]
    PartialRollback(Vec<AppError>),
}

fn join_messages(errors: &[AppError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl AppError {
    pub fn validation(kind: ValidationKind, detail: impl Into<String>) -> Self {
        Self::Validation {
            kind,
            detail: detail.into(),
        }
    }

    pub fn invalid_type(detail: impl Into<String>) -> Self {
        Self::validation(ValidationKind::InvalidType, detail)
    }

    pub fn invalid_format(detail: impl Into<String>) -> Self {
        Self::validation(ValidationKind::InvalidFormat, detail)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::validation(ValidationKind::MissingField, format!("{field} is required"))
    }

    pub fn auth(kind: AuthErrorKind) -> Self {
        Self::Auth(kind)
    }

    pub fn permission_denied() -> Self {
        Self::Auth(AuthErrorKind::PermissionDenied)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn business(msg: impl Into<String>) -> Self {
        Self::Business(msg.into())
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal {
            kind: InternalKind::Unexpected,
            detail: detail.into(),
        }
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::Internal {
            kind: InternalKind::Unavailable,
            detail: detail.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::Validation { .. } => ErrorCategory::Validation,
            AppError::Auth(_) => ErrorCategory::Auth,
            AppError::NotFound(_) => ErrorCategory::NotFound,
            AppError::Conflict(_) => ErrorCategory::Conflict,
            AppError::Business(_) => ErrorCategory::Business,
            AppError::Internal { .. } | AppError::PartialRollback(_) => ErrorCategory::Internal,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { kind, .. } => kind.code(),
            AppError::Auth(kind) => kind.code(),
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT_DUPLICATE_RESOURCE",
            AppError::Business(_) => "BUSINESS_RULE_VIOLATION",
            AppError::Internal { kind, .. } => kind.code(),
            AppError::PartialRollback(_) => "INTERNAL_PARTIAL_ROLLBACK",
        }
    }

    pub fn auth_kind(&self) -> Option<AuthErrorKind> {
        match self {
            AppError::Auth(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }
}

impl From<Interrupted> for AppError {
    fn from(value: Interrupted) -> Self {
        let kind = match value {
            Interrupted::Cancelled => InternalKind::Cancelled,
            Interrupted::DeadlineExceeded => InternalKind::DeadlineExceeded,
        };
        AppError::Internal {
            kind,
            detail: value.to_string(),
        }
    }
}
