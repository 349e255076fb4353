use std::sync::Arc;

use tracing::info;

use warden_auth::{Tenant, TenantStatus, TenantUpdate};
use warden_core::{AppResult, Clock, RequestContext, TenantId};

use crate::document_store::{Repositories, TenantStore, unique};

/// Read and update access to tenant records.
///
/// Creation and deletion are multi-step workflows and live in [`crate::saga`].
pub struct TenantDirectory {
    tenants: TenantStore,
    clock: Arc<dyn Clock>,
}

impl core::fmt::Debug for TenantDirectory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TenantDirectory").finish_non_exhaustive()
    }
}

impl TenantDirectory {
    pub fn new(repos: &Repositories, clock: Arc<dyn Clock>) -> Self {
        Self {
            tenants: repos.tenants.clone(),
            clock,
        }
    }

    pub fn get_tenant(&self, ctx: &RequestContext, tenant_id: TenantId) -> AppResult<Tenant> {
        Ok(self.tenants.get(ctx, tenant_id, tenant_id)?)
    }

    pub fn find_by_name(&self, ctx: &RequestContext, name: &str) -> AppResult<Option<Tenant>> {
        Ok(self.tenants.find_unique(ctx, &unique::tenant_name(name))?)
    }

    pub fn list_tenants(&self, ctx: &RequestContext, status: Option<TenantStatus>) -> AppResult<Vec<Tenant>> {
        let mut tenants = self.tenants.list_all(ctx)?;
        if let Some(status) = status {
            tenants.retain(|t| t.status == status);
        }
        Ok(tenants)
    }

    /// Rename or change status. Taking another tenant's name is a `Conflict`.
    pub fn update_tenant(&self, ctx: &RequestContext, tenant_id: TenantId, update: TenantUpdate) -> AppResult<Tenant> {
        let mut tenant = self.tenants.get(ctx, tenant_id, tenant_id)?;
        update.apply(&mut tenant, self.clock.now())?;
        let tenant = self.tenants.replace(ctx, tenant)?;
        info!(target: "audit", tenant_id = %tenant_id, name = %tenant.name, status = ?tenant.status, "tenant updated");
        Ok(tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use warden_auth::NewTenant;
    use warden_core::{AppError, SystemClock};

    use crate::document_store::DocumentStore;

    fn seed(repos: &Repositories, name: &str, status: TenantStatus) -> Tenant {
        let tenant = NewTenant {
            id: None,
            name: name.into(),
            status,
            admin_email: "admin@example.test".into(),
            admin_password: String::new(),
        }
        .to_tenant(None, Utc::now());
        repos.tenants.insert(&RequestContext::background(), tenant).unwrap()
    }

    #[test]
    fn list_filters_by_status() {
        let repos = Repositories::in_memory();
        let tenants = TenantDirectory::new(&repos, Arc::new(SystemClock));
        let ctx = RequestContext::background();
        seed(&repos, "acme", TenantStatus::Active);
        let trial = seed(&repos, "globex", TenantStatus::Trial);

        assert_eq!(tenants.list_tenants(&ctx, None).unwrap().len(), 2);
        assert_eq!(tenants.list_tenants(&ctx, Some(TenantStatus::Trial)).unwrap(), vec![trial]);
    }

    #[test]
    fn renaming_onto_an_existing_name_conflicts() {
        let repos = Repositories::in_memory();
        let tenants = TenantDirectory::new(&repos, Arc::new(SystemClock));
        let ctx = RequestContext::background();
        seed(&repos, "acme", TenantStatus::Active);
        let globex = seed(&repos, "globex", TenantStatus::Active);

        let err = tenants
            .update_tenant(
                &ctx,
                globex.id,
                TenantUpdate {
                    name: Some("ACME".into()),
                    ..TenantUpdate::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let renamed = tenants
            .update_tenant(
                &ctx,
                globex.id,
                TenantUpdate {
                    name: Some("Globex Corp".into()),
                    status: Some(TenantStatus::Suspended),
                },
            )
            .unwrap();
        assert_eq!(renamed.name, "Globex Corp");
        assert_eq!(tenants.find_by_name(&ctx, "globex corp").unwrap(), Some(renamed));
        assert!(tenants.get_tenant(&ctx, TenantId::new()).unwrap_err().is_not_found());
    }
}
