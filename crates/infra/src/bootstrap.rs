//! Startup seeding of the system tenant.

use tracing::{info, warn};

use warden_auth::{NewTenant, PermissionString, TenantStatus, generate_password};
use warden_core::{AppError, AppResult, RequestContext, SYSTEM_ADMIN_ROLE, SYSTEM_TENANT_NAME, SystemIdentity};

use crate::document_store::{Repositories, unique};
use crate::saga::TenantProvisioningSaga;

#[derive(Debug, Clone)]
pub struct SystemAdminSeed {
    pub email: String,
    /// Generated when absent.
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Bootstrapped {
    pub identity: SystemIdentity,
    /// Set only on the run that created the administrator with a generated password.
    pub generated_password: Option<String>,
}

/// Make sure the system tenant exists and return its identity.
///
/// Idempotent: when the tenant is already there its ids are read back instead.
pub fn seed_system_tenant(
    ctx: &RequestContext,
    repos: &Repositories,
    saga: &TenantProvisioningSaga,
    seed: SystemAdminSeed,
) -> AppResult<Bootstrapped> {
    if let Some(tenant) = repos.tenants.find_unique(ctx, &unique::tenant_name(SYSTEM_TENANT_NAME))? {
        let identity = recover(ctx, repos, tenant.id)?;
        info!(tenant_id = %tenant.id, "system tenant already present");
        return Ok(Bootstrapped {
            identity,
            generated_password: None,
        });
    }

    let (password, generated_password) = match seed.password {
        Some(password) => (password, None),
        None => {
            let password = generate_password();
            (password.clone(), Some(password))
        }
    };
    let defaults = saga.provision_with_role(
        ctx,
        NewTenant {
            id: None,
            name: SYSTEM_TENANT_NAME.to_string(),
            status: TenantStatus::Active,
            admin_email: seed.email,
            admin_password: password,
        },
        None,
        SYSTEM_ADMIN_ROLE,
    )?;
    if generated_password.is_some() {
        warn!(tenant_id = %defaults.tenant_id, "system administrator password was generated");
    }

    Ok(Bootstrapped {
        identity: SystemIdentity::new(
            defaults.tenant_id,
            defaults.role_id,
            defaults.permission_id,
            defaults.user_id,
        ),
        generated_password,
    })
}

fn recover(ctx: &RequestContext, repos: &Repositories, tenant_id: warden_core::TenantId) -> AppResult<SystemIdentity> {
    let incomplete = |what: &str| AppError::internal(format!("system tenant exists without its {what}"));

    let role = repos
        .roles
        .find_unique(ctx, &unique::role_slug(tenant_id, SYSTEM_ADMIN_ROLE))?
        .ok_or_else(|| incomplete("administrator role"))?;
    let permission = repos
        .permissions
        .find_unique(ctx, &unique::permission_string(tenant_id, PermissionString::wildcard().as_str()))?
        .ok_or_else(|| incomplete("wildcard permission"))?;
    let admin = repos
        .users
        .list(ctx, tenant_id)?
        .into_iter()
        .find(|user| user.roles.iter().any(|a| a.role_id == role.id))
        .ok_or_else(|| incomplete("administrator"))?;

    Ok(SystemIdentity::new(tenant_id, role.id, permission.id, admin.id))
}
