//! Identity of the distinguished system tenant.

use serde::{Deserialize, Serialize};

use crate::id::{PermissionId, RoleId, TenantId, UserId};

/// Name of the tenant whose members may act across tenant boundaries.
pub const SYSTEM_TENANT_NAME: &str = "system";

/// Slug of the administrator role seeded into the system tenant.
pub const SYSTEM_ADMIN_ROLE: &str = "system_admin";

/// Slug of the administrator role seeded into every other tenant.
pub const TENANT_ADMIN_ROLE: &str = "tenant_admin";

/// Ids of the records seeded for the system tenant at startup.
///
/// Produced once by the bootstrap step and passed by value into every component
/// that needs to recognise system callers. Never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemIdentity {
    tenant_id: TenantId,
    admin_role_id: RoleId,
    wildcard_permission_id: PermissionId,
    admin_user_id: UserId,
}

impl SystemIdentity {
    pub fn new(
        tenant_id: TenantId,
        admin_role_id: RoleId,
        wildcard_permission_id: PermissionId,
        admin_user_id: UserId,
    ) -> Self {
        Self {
            tenant_id,
            admin_role_id,
            wildcard_permission_id,
            admin_user_id,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn admin_role_id(&self) -> RoleId {
        self.admin_role_id
    }

    pub fn wildcard_permission_id(&self) -> PermissionId {
        self.wildcard_permission_id
    }

    pub fn admin_user_id(&self) -> UserId {
        self.admin_user_id
    }

    pub fn is_system_tenant(&self, tenant_id: TenantId) -> bool {
        self.tenant_id == tenant_id
    }
}
