//! Tenant provisioning: tenant → wildcard permission → admin role → admin user.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use warden_auth::{NewPermission, NewRole, NewTenant, NewUser, UserStatus};
use warden_core::{
    AppError, AppResult, Clock, PermissionId, RequestContext, RoleId, SYSTEM_ADMIN_ROLE, TENANT_ADMIN_ROLE, TenantId,
    UserId,
};

use super::{CompensationStack, combine};
use crate::document_store::{Repositories, unique};
use crate::users::UserDirectory;

/// Ids of the records a successful provisioning created. Doubles as the rollback manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantDefaults {
    pub tenant_id: TenantId,
    pub permission_id: PermissionId,
    pub role_id: RoleId,
    pub user_id: UserId,
}

pub struct TenantProvisioningSaga {
    repos: Repositories,
    users: Arc<UserDirectory>,
    clock: Arc<dyn Clock>,
}

impl core::fmt::Debug for TenantProvisioningSaga {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TenantProvisioningSaga").finish_non_exhaustive()
    }
}

impl TenantProvisioningSaga {
    pub fn new(repos: Repositories, users: Arc<UserDirectory>, clock: Arc<dyn Clock>) -> Self {
        Self { repos, users, clock }
    }

    /// Create a tenant with its default security posture.
    ///
    /// Either every record exists afterwards or none of the new ones do; a
    /// failure during cleanup is reported as `PartialRollback`.
    pub fn provision(
        &self,
        ctx: &RequestContext,
        new_tenant: NewTenant,
        created_by: Option<UserId>,
    ) -> AppResult<TenantDefaults> {
        self.provision_with_role(ctx, new_tenant, created_by, TENANT_ADMIN_ROLE)
    }

    #[instrument(skip(self, ctx, new_tenant, created_by), fields(tenant = %new_tenant.name), err)]
    pub(crate) fn provision_with_role(
        &self,
        ctx: &RequestContext,
        new_tenant: NewTenant,
        created_by: Option<UserId>,
        admin_role_slug: &str,
    ) -> AppResult<TenantDefaults> {
        new_tenant.validate()?;
        if self
            .repos
            .tenants
            .find_unique(ctx, &unique::tenant_name(&new_tenant.name))?
            .is_some()
        {
            return Err(AppError::conflict(format!("tenant '{}' already exists", new_tenant.name.trim())));
        }

        let tenant = self
            .repos
            .tenants
            .insert(ctx, new_tenant.to_tenant(created_by, self.clock.now()))?;
        let tenant_id = tenant.id;

        let mut compensation = CompensationStack::new();
        let tenants = self.repos.tenants.clone();
        compensation.push("delete tenant", move |ctx| {
            tenants.delete(ctx, tenant_id, tenant_id)?;
            Ok(())
        });

        match self.create_defaults(ctx, tenant_id, &new_tenant, created_by, admin_role_slug, &mut compensation) {
            Ok(defaults) => {
                compensation.commit();
                info!(
                    target: "audit",
                    tenant_id = %tenant_id,
                    tenant = %tenant.name,
                    admin_user_id = %defaults.user_id,
                    "tenant provisioned"
                );
                Ok(defaults)
            }
            Err(cause) => {
                let err = compensation.unwind(ctx, cause);
                info!(target: "audit", tenant_id = %tenant_id, error = %err, "tenant provisioning rolled back");
                Err(err)
            }
        }
    }

    fn create_defaults(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        new_tenant: &NewTenant,
        created_by: Option<UserId>,
        admin_role_slug: &str,
        compensation: &mut CompensationStack,
    ) -> AppResult<TenantDefaults> {
        let now = self.clock.now();

        let permission = NewPermission::wildcard().into_permission(tenant_id, created_by, now)?;
        let permission_id = self.repos.permissions.insert(ctx, permission)?.id;
        let permissions = self.repos.permissions.clone();
        compensation.push("delete wildcard permission", move |ctx| {
            permissions.delete(ctx, tenant_id, permission_id)?;
            Ok(())
        });

        let name = if admin_role_slug == SYSTEM_ADMIN_ROLE {
            "System Administrator"
        } else {
            "Tenant Administrator"
        };
        let role = NewRole {
            name: name.to_string(),
            slug: admin_role_slug.to_string(),
            description: "Full access within the tenant".to_string(),
            permissions: vec![permission_id],
            priority: 100,
            is_system_role: true,
        }
        .into_role(tenant_id, created_by, now)?;
        let role_id = self.repos.roles.insert(ctx, role)?.id;
        let roles = self.repos.roles.clone();
        compensation.push("delete admin role", move |ctx| {
            roles.delete(ctx, tenant_id, role_id)?;
            Ok(())
        });

        // Same checks as any other account: password policy, uniqueness.
        let admin = NewUser {
            email: new_tenant.admin_email.clone(),
            username: None,
            password: new_tenant.admin_password.clone(),
            status: UserStatus::Active,
            roles: vec![role_id],
        };
        let user_id = self.users.create_user(ctx, tenant_id, admin, created_by)?.id;

        Ok(TenantDefaults {
            tenant_id,
            permission_id,
            role_id,
            user_id,
        })
    }

    /// Delete everything a provisioning created, attempting every delete.
    ///
    /// For callers that fail at some later step of their own. Records already
    /// gone count as deleted.
    pub fn rollback_defaults(&self, ctx: &RequestContext, manifest: &TenantDefaults) -> AppResult<()> {
        let ctx = ctx.detached();
        let t = manifest.tenant_id;
        let outcomes = [
            self.repos.users.delete(&ctx, t, manifest.user_id),
            self.repos.roles.delete(&ctx, t, manifest.role_id),
            self.repos.permissions.delete(&ctx, t, manifest.permission_id),
            self.repos.tenants.delete(&ctx, t, t),
        ];
        let failures: Vec<AppError> = outcomes
            .into_iter()
            .filter_map(|outcome| outcome.err().map(AppError::from))
            .collect();
        info!(target: "audit", tenant_id = %t, failures = failures.len(), "tenant defaults rolled back");
        combine(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use warden_auth::{Argon2Hasher, PasswordPolicy, Permission, Role, TenantStatus};
    use warden_core::{InternalKind, ManualClock, ValidationKind};

    use crate::document_store::faulty::FaultyStore;

    const PASSWORD: &str = "Sup3r-Secret-Admin!";

    fn saga_over(repos: &Repositories) -> TenantProvisioningSaga {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let hasher = Argon2Hasher::with_cost(1024, 1).unwrap();
        let users = UserDirectory::new(repos, Arc::new(hasher), PasswordPolicy::default(), clock.clone());
        TenantProvisioningSaga::new(repos.clone(), Arc::new(users), clock)
    }

    fn acme(id: Option<TenantId>, email: &str) -> NewTenant {
        NewTenant {
            id,
            name: "acme".into(),
            status: TenantStatus::Active,
            admin_email: email.into(),
            admin_password: PASSWORD.into(),
        }
    }

    fn residue(repos: &Repositories, t: TenantId) -> (usize, usize, bool) {
        let ctx = RequestContext::background();
        (
            repos.permissions.list(&ctx, t).unwrap().len(),
            repos.roles.list(&ctx, t).unwrap().len(),
            repos.tenants.list_all(&ctx).unwrap().iter().any(|x| x.id == t),
        )
    }

    #[test]
    fn provisions_tenant_permission_role_and_admin() {
        let repos = Repositories::in_memory();
        let saga = saga_over(&repos);
        let ctx = RequestContext::background();
        let defaults = saga.provision(&ctx, acme(None, "admin@acme.test"), None).unwrap();

        let t = defaults.tenant_id;
        let permission = repos.permissions.get(&ctx, t, defaults.permission_id).unwrap();
        assert!(permission.permission_string.is_wildcard());
        assert!(permission.is_dangerous);
        let role = repos.roles.get(&ctx, t, defaults.role_id).unwrap();
        assert_eq!(role.slug, TENANT_ADMIN_ROLE);
        assert_eq!(role.permissions, vec![defaults.permission_id]);
        let admin = repos.users.get(&ctx, t, defaults.user_id).unwrap();
        assert_eq!(admin.username, "admin@acme.test");
        assert_eq!(admin.live_role_ids(Utc::now()), vec![defaults.role_id]);
    }

    #[test]
    fn duplicate_tenant_name_conflicts_before_any_write() {
        let repos = Repositories::in_memory();
        let saga = saga_over(&repos);
        let ctx = RequestContext::background();
        saga.provision(&ctx, acme(None, "admin@acme.test"), None).unwrap();
        let err = saga.provision(&ctx, acme(None, "other@acme.test"), None).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(repos.tenants.list_all(&ctx).unwrap().len(), 1);
    }

    #[test]
    fn admin_creation_failure_leaves_no_residue() {
        let repos = Repositories::in_memory();
        let saga = saga_over(&repos);
        let ctx = RequestContext::background();
        let t = TenantId::new();
        let squatter = NewUser {
            email: "admin@acme.test".into(),
            password: "x".into(),
            ..NewUser::default()
        }
        .into_user(t, "hash".into(), None, Utc::now())
        .unwrap();
        repos.users.insert(&ctx, squatter).unwrap();

        let err = saga.provision(&ctx, acme(Some(t), "admin@acme.test"), None).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(residue(&repos, t), (0, 0, false));
    }

    #[test]
    fn weak_admin_password_rolls_back() {
        let repos = Repositories::in_memory();
        let saga = saga_over(&repos);
        let ctx = RequestContext::background();
        let t = TenantId::new();
        let err = saga
            .provision(
                &ctx,
                NewTenant {
                    admin_password: "short".into(),
                    ..acme(Some(t), "admin@acme.test")
                },
                None,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation {
                kind: ValidationKind::WeakPassword,
                ..
            }
        ));
        assert_eq!(residue(&repos, t), (0, 0, false));
    }

    fn is_unavailable(err: &AppError) -> bool {
        matches!(
            err,
            AppError::Internal {
                kind: InternalKind::Unavailable,
                ..
            }
        )
    }

    #[test]
    fn permission_insert_failure_leaves_no_residue() {
        let mut repos = Repositories::in_memory();
        repos.permissions = Arc::new(FaultyStore::<Permission>::failing_inserts());
        let saga = saga_over(&repos);
        let ctx = RequestContext::background();
        let t = TenantId::new();

        let err = saga.provision(&ctx, acme(Some(t), "admin@acme.test"), None).unwrap_err();
        assert!(is_unavailable(&err), "got {err:?}");
        assert_eq!(residue(&repos, t), (0, 0, false));
        assert!(repos.users.list(&ctx, t).unwrap().is_empty());
    }

    #[test]
    fn role_insert_failure_removes_the_permission_and_tenant() {
        let mut repos = Repositories::in_memory();
        repos.roles = Arc::new(FaultyStore::<Role>::failing_inserts());
        let saga = saga_over(&repos);
        let ctx = RequestContext::background();
        let t = TenantId::new();

        let err = saga.provision(&ctx, acme(Some(t), "admin@acme.test"), None).unwrap_err();
        assert!(is_unavailable(&err), "got {err:?}");
        assert_eq!(residue(&repos, t), (0, 0, false));
        assert!(repos.users.list(&ctx, t).unwrap().is_empty());
        assert!(repos.tenants.find_unique(&ctx, &unique::tenant_name("acme")).unwrap().is_none());
    }

    #[test]
    fn failing_compensation_reports_partial_rollback_but_runs_every_step() {
        let mut repos = Repositories::in_memory();
        repos.roles = Arc::new(FaultyStore::<Role>::failing_deletes());
        let saga = saga_over(&repos);
        let ctx = RequestContext::background();
        let t = TenantId::new();
        let err = saga
            .provision(
                &ctx,
                NewTenant {
                    admin_password: "short".into(),
                    ..acme(Some(t), "admin@acme.test")
                },
                None,
            )
            .unwrap_err();

        match err {
            AppError::PartialRollback(failures) => assert_eq!(failures.len(), 2),
            other => panic!("expected partial rollback, got {other:?}"),
        }
        let (permissions, roles, tenant_left) = residue(&repos, t);
        assert_eq!((permissions, roles, tenant_left), (0, 1, false));
    }

    #[test]
    fn rollback_defaults_is_idempotent() {
        let repos = Repositories::in_memory();
        let saga = saga_over(&repos);
        let ctx = RequestContext::background();
        let defaults = saga.provision(&ctx, acme(None, "admin@acme.test"), None).unwrap();

        saga.rollback_defaults(&ctx, &defaults).unwrap();
        assert_eq!(residue(&repos, defaults.tenant_id), (0, 0, false));
        assert!(repos.users.list(&ctx, defaults.tenant_id).unwrap().is_empty());
        saga.rollback_defaults(&ctx, &defaults).unwrap();
    }
}
