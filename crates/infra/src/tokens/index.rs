use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use warden_core::{RequestContext, TenantId, TokenId, UserId};

use super::keys::TokenKind;
use crate::credential_store::{CredentialStore, StoreError};

/// Reverse lookup from `(tenant, user)` to the ids of their tokens.
///
/// Used only to enumerate tokens for bulk revocation. Validity is always
/// decided by the token record itself; a stale id here is harmless.
#[derive(Clone)]
pub struct TokenIndex {
    store: Arc<dyn CredentialStore>,
}

impl TokenIndex {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Record a token id. The set lives as long as its longest-lived member.
    pub fn register(
        &self,
        ctx: &RequestContext,
        kind: TokenKind,
        tenant_id: TenantId,
        user_id: UserId,
        token_id: &TokenId,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.store
            .set_add(ctx, &kind.index_key(tenant_id, user_id), token_id.as_str(), ttl)
    }

    pub fn unregister(
        &self,
        ctx: &RequestContext,
        kind: TokenKind,
        tenant_id: TenantId,
        user_id: UserId,
        token_id: &TokenId,
    ) -> Result<bool, StoreError> {
        self.store
            .set_remove(ctx, &kind.index_key(tenant_id, user_id), token_id.as_str())
    }

    pub fn members(
        &self,
        ctx: &RequestContext,
        kind: TokenKind,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Vec<TokenId>, StoreError> {
        Ok(self
            .store
            .set_members(ctx, &kind.index_key(tenant_id, user_id))?
            .into_iter()
            .map(TokenId::new)
            .collect())
    }

    /// Drop both index sets of a user.
    pub fn clear(&self, ctx: &RequestContext, tenant_id: TenantId, user_id: UserId) -> Result<(), StoreError> {
        for kind in TokenKind::ALL {
            self.store.delete(ctx, &kind.index_key(tenant_id, user_id))?;
        }
        Ok(())
    }

    /// Drop every index set of a tenant. Individual failures are logged and skipped.
    pub fn clear_tenant(&self, ctx: &RequestContext, tenant_id: TenantId) -> Result<usize, StoreError> {
        let mut cleared = 0;
        for kind in TokenKind::ALL {
            for key in self.store.scan_prefix(ctx, &kind.tenant_index_prefix(tenant_id))? {
                match self.store.delete(ctx, &key) {
                    Ok(true) => cleared += 1,
                    Ok(false) => {}
                    Err(e) => warn!(key = %key, error = %e, "failed to clear token index"),
                }
            }
        }
        Ok(cleared)
    }
}

impl core::fmt::Debug for TokenIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenIndex").finish_non_exhaustive()
    }
}
