//! Role-based access control: permission resolution and the role/permission write path.

pub mod engine;
pub mod resource;

pub use engine::PermissionResolutionEngine;
pub use resource::{ResourceId, ResourceKind, ResourcePayload, ResourceRecord, ResourceUpdate};
