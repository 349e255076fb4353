use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{AppError, AppResult, PermissionId, RoleId, TenantId, UserId};

use crate::permissions::RecordStatus;

/// A named bundle of permission references within a tenant.
///
/// Permissions are referenced by id and resolved when a check runs, so
/// deactivating a permission takes effect for every role that points at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub tenant_id: TenantId,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub permissions: Vec<PermissionId>,
    pub status: RecordStatus,
    pub priority: i32,
    pub is_system_role: bool,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    /// Derived from the name when empty.
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: Vec<PermissionId>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub is_system_role: bool,
}

impl NewRole {
    pub fn into_role(
        self,
        tenant_id: TenantId,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> AppResult<Role> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::missing_field("role name"));
        }
        let slug = if self.slug.trim().is_empty() {
            slugify(&name)
        } else {
            self.slug.trim().to_string()
        };

        Ok(Role {
            id: RoleId::new(),
            tenant_id,
            name,
            slug,
            description: self.description,
            permissions: dedup(self.permissions),
            status: RecordStatus::Active,
            priority: self.priority,
            is_system_role: self.is_system_role,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<Vec<PermissionId>>,
    pub priority: Option<i32>,
    pub status: Option<RecordStatus>,
}

impl RoleUpdate {
    pub fn apply(self, role: &mut Role, now: DateTime<Utc>) -> AppResult<()> {
        if let Some(name) = self.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(AppError::missing_field("role name"));
            }
            role.name = name;
        }
        if let Some(description) = self.description {
            role.description = description;
        }
        if let Some(permissions) = self.permissions {
            role.permissions = dedup(permissions);
        }
        if let Some(priority) = self.priority {
            role.priority = priority;
        }
        if let Some(status) = self.status {
            role.status = status;
        }
        role.updated_at = now;
        Ok(())
    }
}

/// A role granted to a user, optionally time-boxed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role_id: RoleId,
    pub tenant_id: TenantId,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: Option<UserId>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl RoleAssignment {
    pub fn new(role_id: RoleId, tenant_id: TenantId, assigned_by: Option<UserId>, now: DateTime<Utc>) -> Self {
        Self {
            role_id,
            tenant_id,
            assigned_at: now,
            assigned_by,
            expires_at: None,
        }
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
    }
    slug.trim_end_matches('_').to_string()
}

fn dedup(mut ids: Vec<PermissionId>) -> Vec<PermissionId> {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(*id));
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn slug_is_derived_from_name() {
        let role = NewRole {
            name: "Tenant Administrator".into(),
            ..NewRole::default()
        }
        .into_role(TenantId::new(), None, Utc::now())
        .unwrap();
        assert_eq!(role.slug, "tenant_administrator");
    }

    #[test]
    fn blank_name_is_rejected() {
        let err = NewRole::default()
            .into_role(TenantId::new(), None, Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_MISSING_FIELD");
    }

    #[test]
    fn duplicate_permission_refs_collapse() {
        let p = PermissionId::new();
        let role = NewRole {
            name: "clerk".into(),
            permissions: vec![p, p],
            ..NewRole::default()
        }
        .into_role(TenantId::new(), None, Utc::now())
        .unwrap();
        assert_eq!(role.permissions, vec![p]);
    }

    #[test]
    fn assignment_liveness_follows_expiry() {
        let now = Utc::now();
        let open = RoleAssignment::new(RoleId::new(), TenantId::new(), None, now);
        assert!(open.is_live(now + Duration::days(365)));

        let boxed = open.clone().expiring_at(now + Duration::hours(1));
        assert!(boxed.is_live(now));
        assert!(!boxed.is_live(now + Duration::hours(1)));
    }
}
