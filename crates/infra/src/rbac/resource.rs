//! Closed dispatch over the RBAC resource kinds served by the generic CRUD surface.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use warden_auth::{NewPermission, NewRole, Permission, PermissionUpdate, ResourceType, Role, RoleUpdate};
use warden_core::{AppError, AppResult, PermissionId, RoleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Role,
    Permission,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Role => "role",
            ResourceKind::Permission => "permission",
        }
    }

    /// Resource component of the permission strings guarding this kind.
    pub fn resource_type(&self) -> ResourceType {
        match self {
            ResourceKind::Role => ResourceType::Role,
            ResourceKind::Permission => ResourceType::Permission,
        }
    }
}

impl FromStr for ResourceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "role" => Ok(ResourceKind::Role),
            "permission" => Ok(ResourceKind::Permission),
            other => Err(AppError::invalid_type(format!("unknown resource kind '{other}'"))),
        }
    }
}

impl core::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Role(RoleId),
    Permission(PermissionId),
}

impl ResourceId {
    pub fn parse(kind: ResourceKind, raw: &str) -> AppResult<Self> {
        Ok(match kind {
            ResourceKind::Role => ResourceId::Role(raw.parse()?),
            ResourceKind::Permission => ResourceId::Permission(raw.parse()?),
        })
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceId::Role(_) => ResourceKind::Role,
            ResourceId::Permission(_) => ResourceKind::Permission,
        }
    }
}

impl core::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ResourceId::Role(id) => write!(f, "role {id}"),
            ResourceId::Permission(id) => write!(f, "permission {id}"),
        }
    }
}

fn extract<T: serde::de::DeserializeOwned>(kind: ResourceKind, data: JsonValue) -> AppResult<T> {
    serde_json::from_value(data).map_err(|e| AppError::invalid_format(format!("malformed {kind} payload: {e}")))
}

/// Creation input for one resource kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourcePayload {
    Role(NewRole),
    Permission(NewPermission),
}

impl ResourcePayload {
    /// Decode the kind-specific create body from loosely typed request data.
    pub fn extract(kind: ResourceKind, data: JsonValue) -> AppResult<Self> {
        Ok(match kind {
            ResourceKind::Role => ResourcePayload::Role(extract(kind, data)?),
            ResourceKind::Permission => ResourcePayload::Permission(extract(kind, data)?),
        })
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourcePayload::Role(_) => ResourceKind::Role,
            ResourcePayload::Permission(_) => ResourceKind::Permission,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceUpdate {
    Role(RoleUpdate),
    Permission(PermissionUpdate),
}

impl ResourceUpdate {
    pub fn extract(kind: ResourceKind, data: JsonValue) -> AppResult<Self> {
        Ok(match kind {
            ResourceKind::Role => ResourceUpdate::Role(extract(kind, data)?),
            ResourceKind::Permission => ResourceUpdate::Permission(extract(kind, data)?),
        })
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceUpdate::Role(_) => ResourceKind::Role,
            ResourceUpdate::Permission(_) => ResourceKind::Permission,
        }
    }
}

/// A stored resource of either kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceRecord {
    Role(Role),
    Permission(Permission),
}

impl ResourceRecord {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceRecord::Role(_) => ResourceKind::Role,
            ResourceRecord::Permission(_) => ResourceKind::Permission,
        }
    }

    pub fn id(&self) -> ResourceId {
        match self {
            ResourceRecord::Role(role) => ResourceId::Role(role.id),
            ResourceRecord::Permission(permission) => ResourceId::Permission(permission.id),
        }
    }

    /// Apply an update of the same kind. A kind mismatch is an `InvalidType` failure.
    pub fn apply_update(&mut self, update: ResourceUpdate, now: DateTime<Utc>) -> AppResult<()> {
        match (self, update) {
            (ResourceRecord::Role(role), ResourceUpdate::Role(update)) => update.apply(role, now),
            (ResourceRecord::Permission(permission), ResourceUpdate::Permission(update)) => {
                update.apply(permission, now);
                Ok(())
            }
            (record, update) => Err(AppError::invalid_type(format!(
                "cannot apply a {} update to a {}",
                update.kind(),
                record.kind()
            ))),
        }
    }
}
