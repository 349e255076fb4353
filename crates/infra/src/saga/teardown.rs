//! Tenant deletion: a lenient cascade, not a saga.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use warden_auth::RevokeReason;
use warden_core::{AppResult, RequestContext, TenantId, UserId};

use crate::document_store::Repositories;
use crate::tokens::{RevocationSummary, TokenLifecycleManager};

/// What a deletion managed to remove.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub tokens: RevocationSummary,
    pub users: usize,
    pub roles: usize,
    pub permissions: usize,
    /// `false` when the tenant record was already gone.
    pub tenant_deleted: bool,
}

pub struct TenantTeardown {
    repos: Repositories,
    tokens: Arc<TokenLifecycleManager>,
}

impl core::fmt::Debug for TenantTeardown {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TenantTeardown").finish_non_exhaustive()
    }
}

impl TenantTeardown {
    pub fn new(repos: Repositories, tokens: Arc<TokenLifecycleManager>) -> Self {
        Self { repos, tokens }
    }

    /// Revoke tokens, then delete users, roles, permissions and the tenant.
    ///
    /// Each step's failure is logged and the cascade moves on. Only a failure
    /// to delete the tenant record itself is returned.
    pub fn delete_tenant(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        deleted_by: Option<UserId>,
    ) -> AppResult<TeardownReport> {
        let mut report = TeardownReport::default();

        match self
            .tokens
            .revoke_all_for_tenant(ctx, tenant_id, deleted_by, RevokeReason::TenantDeleted)
        {
            Ok(summary) => report.tokens = summary,
            Err(e) => warn!(tenant_id = %tenant_id, error = %e, "tenant token revocation failed"),
        }
        match self.repos.users.delete_by_tenant(ctx, tenant_id) {
            Ok(n) => report.users = n,
            Err(e) => warn!(tenant_id = %tenant_id, error = %e, "tenant user deletion failed"),
        }
        match self.repos.roles.delete_by_tenant(ctx, tenant_id) {
            Ok(n) => report.roles = n,
            Err(e) => warn!(tenant_id = %tenant_id, error = %e, "tenant role deletion failed"),
        }
        match self.repos.permissions.delete_by_tenant(ctx, tenant_id) {
            Ok(n) => report.permissions = n,
            Err(e) => warn!(tenant_id = %tenant_id, error = %e, "tenant permission deletion failed"),
        }

        report.tenant_deleted = self.repos.tenants.delete(ctx, tenant_id, tenant_id)?;
        info!(
            target: "audit",
            tenant_id = %tenant_id,
            tokens = report.tokens.total(),
            users = report.users,
            roles = report.roles,
            permissions = report.permissions,
            "tenant deleted"
        );
        Ok(report)
    }
}
