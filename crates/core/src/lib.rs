//! Foundation types for the identity service.
//!
//! Identifiers, the error taxonomy, request cancellation, the clock and the
//! system identity. No storage or transport concerns live here.

pub mod clock;
pub mod context;
pub mod error;
pub mod id;
pub mod system;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{CancelHandle, Interrupted, RequestContext};
pub use error::{AppError, AppResult, AuthErrorKind, ErrorCategory, InternalKind, ValidationKind};
pub use id::{PermissionId, RoleId, TenantId, TokenId, UserId};
pub use system::{SYSTEM_ADMIN_ROLE, SYSTEM_TENANT_NAME, SystemIdentity, TENANT_ADMIN_ROLE};
