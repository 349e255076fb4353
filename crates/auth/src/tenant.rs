//! Tenant record.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{AppError, AppResult, TenantId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    #[default]
    Active,
    Suspended,
    Inactive,
    Trial,
}

impl FromStr for TenantStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TenantStatus::Active),
            "suspended" => Ok(TenantStatus::Suspended),
            "inactive" => Ok(TenantStatus::Inactive),
            "trial" => Ok(TenantStatus::Trial),
            other => Err(AppError::invalid_type(format!("unknown tenant status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub status: TenantStatus,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to provision a tenant together with its first administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTenant {
    /// Explicit id, for callers that must know it up front.
    #[serde(default)]
    pub id: Option<TenantId>,
    pub name: String,
    #[serde(default)]
    pub status: TenantStatus,
    pub admin_email: String,
    pub admin_password: String,
}

impl NewTenant {
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::missing_field("tenant name"));
        }
        Ok(())
    }

    pub fn to_tenant(&self, created_by: Option<UserId>, now: DateTime<Utc>) -> Tenant {
        Tenant {
            id: self.id.unwrap_or_default(),
            name: self.name.trim().to_string(),
            status: self.status,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantUpdate {
    pub name: Option<String>,
    pub status: Option<TenantStatus>,
}

impl TenantUpdate {
    pub fn apply(self, tenant: &mut Tenant, now: DateTime<Utc>) -> AppResult<()> {
        if let Some(name) = self.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(AppError::missing_field("tenant name"));
            }
            tenant.name = name;
        }
        if let Some(status) = self.status {
            tenant.status = status;
        }
        tenant.updated_at = now;
        Ok(())
    }
}
