use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use warden_core::{AppError, Interrupted, RequestContext};

/// Failure of a storage backend call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("duplicate {0}")]
    Conflict(String),

    /// The record changed since it was read.
    #[error("stale write to {0}")]
    Stale(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record at '{key}': {detail}")]
    Corrupt { key: String, detail: String },

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(what) => AppError::not_found(what),
            StoreError::Conflict(what) => AppError::conflict(format!("duplicate {what}")),
            StoreError::Stale(what) => AppError::conflict(format!("concurrent update of {what}")),
            StoreError::Unavailable(detail) => AppError::unavailable(detail),
            StoreError::Corrupt { .. } => AppError::internal(value.to_string()),
            StoreError::Interrupted(i) => AppError::from(i),
        }
    }
}

/// Key-value store with per-key expiry, holding credential records and index sets.
///
/// Every call is blocking and takes the request context; implementations refuse
/// to touch the backend once the context is cancelled or past its deadline.
/// Writes of a single key are atomic (last write wins).
pub trait CredentialStore: Send + Sync {
    fn get(&self, ctx: &RequestContext, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value` under `key`, replacing any previous value and expiry.
    fn set(&self, ctx: &RequestContext, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// `true` if a key was removed.
    fn delete(&self, ctx: &RequestContext, key: &str) -> Result<bool, StoreError>;

    /// All live keys starting with `prefix`.
    fn scan_prefix(&self, ctx: &RequestContext, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Add `member` to the set at `key`. The set's expiry is extended to `ttl`
    /// if that outlives the current one, never shortened.
    fn set_add(&self, ctx: &RequestContext, key: &str, member: &str, ttl: Duration) -> Result<(), StoreError>;

    fn set_remove(&self, ctx: &RequestContext, key: &str, member: &str) -> Result<bool, StoreError>;

    fn set_members(&self, ctx: &RequestContext, key: &str) -> Result<Vec<String>, StoreError>;
}

impl<S> CredentialStore for Arc<S>
where
    S: CredentialStore + ?Sized,
{
    fn get(&self, ctx: &RequestContext, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(ctx, key)
    }

    fn set(&self, ctx: &RequestContext, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        (**self).set(ctx, key, value, ttl)
    }

    fn delete(&self, ctx: &RequestContext, key: &str) -> Result<bool, StoreError> {
        (**self).delete(ctx, key)
    }

    fn scan_prefix(&self, ctx: &RequestContext, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).scan_prefix(ctx, prefix)
    }

    fn set_add(&self, ctx: &RequestContext, key: &str, member: &str, ttl: Duration) -> Result<(), StoreError> {
        (**self).set_add(ctx, key, member, ttl)
    }

    fn set_remove(&self, ctx: &RequestContext, key: &str, member: &str) -> Result<bool, StoreError> {
        (**self).set_remove(ctx, key, member)
    }

    fn set_members(&self, ctx: &RequestContext, key: &str) -> Result<Vec<String>, StoreError> {
        (**self).set_members(ctx, key)
    }
}
