use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

use warden_core::{RequestContext, TenantId};

use crate::credential_store::StoreError;

/// A record kept in a tenant-partitioned document collection.
pub trait Document: Clone + Send + Sync + 'static {
    type Id: Copy + Eq + Hash + Ord + Display + Send + Sync + 'static;

    /// Human-readable collection name, used in error messages.
    const KIND: &'static str;

    fn id(&self) -> Self::Id;

    /// Partition the record belongs to. Tenants partition by their own id.
    fn tenant_id(&self) -> TenantId;

    /// Keys that must be unique across the whole collection.
    fn unique_keys(&self) -> Vec<String> {
        Vec::new()
    }

    /// Optimistic-concurrency version, for collections that track one.
    fn version(&self) -> Option<u64> {
        None
    }

    fn set_version(&mut self, _version: u64) {}
}

/// Tenant-scoped document collection.
///
/// `NotFound` is reported as [`StoreError::NotFound`], never folded into a
/// backend failure, so callers can treat a missing record as a normal outcome.
pub trait DocumentStore<D: Document>: Send + Sync {
    /// Fails with `Conflict` if the id or any unique key is taken.
    fn insert(&self, ctx: &RequestContext, doc: D) -> Result<D, StoreError>;

    fn get(&self, ctx: &RequestContext, tenant_id: TenantId, id: D::Id) -> Result<D, StoreError>;

    /// Overwrite an existing record. Unique keys are re-checked.
    ///
    /// For versioned documents the stored version must equal the one carried by
    /// `doc`, otherwise the write fails with `Stale`. The returned copy carries
    /// the bumped version.
    fn replace(&self, ctx: &RequestContext, doc: D) -> Result<D, StoreError>;

    /// `false` when nothing was stored under the id.
    fn delete(&self, ctx: &RequestContext, tenant_id: TenantId, id: D::Id) -> Result<bool, StoreError>;

    fn list(&self, ctx: &RequestContext, tenant_id: TenantId) -> Result<Vec<D>, StoreError>;

    fn list_all(&self, ctx: &RequestContext) -> Result<Vec<D>, StoreError>;

    fn find_unique(&self, ctx: &RequestContext, key: &str) -> Result<Option<D>, StoreError>;

    /// Remove every record of a tenant, returning how many went.
    fn delete_by_tenant(&self, ctx: &RequestContext, tenant_id: TenantId) -> Result<usize, StoreError>;
}

impl<D, S> DocumentStore<D> for Arc<S>
where
    D: Document,
    S: DocumentStore<D> + ?Sized,
{
    fn insert(&self, ctx: &RequestContext, doc: D) -> Result<D, StoreError> {
        (**self).insert(ctx, doc)
    }

    fn get(&self, ctx: &RequestContext, tenant_id: TenantId, id: D::Id) -> Result<D, StoreError> {
        (**self).get(ctx, tenant_id, id)
    }

    fn replace(&self, ctx: &RequestContext, doc: D) -> Result<D, StoreError> {
        (**self).replace(ctx, doc)
    }

    fn delete(&self, ctx: &RequestContext, tenant_id: TenantId, id: D::Id) -> Result<bool, StoreError> {
        (**self).delete(ctx, tenant_id, id)
    }

    fn list(&self, ctx: &RequestContext, tenant_id: TenantId) -> Result<Vec<D>, StoreError> {
        (**self).list(ctx, tenant_id)
    }

    fn list_all(&self, ctx: &RequestContext) -> Result<Vec<D>, StoreError> {
        (**self).list_all(ctx)
    }

    fn find_unique(&self, ctx: &RequestContext, key: &str) -> Result<Option<D>, StoreError> {
        (**self).find_unique(ctx, key)
    }

    fn delete_by_tenant(&self, ctx: &RequestContext, tenant_id: TenantId) -> Result<usize, StoreError> {
        (**self).delete_by_tenant(ctx, tenant_id)
    }
}

/// Optional lookup: `NotFound` becomes `None`, every other failure passes through.
pub fn get_optional<D, S>(
    store: &S,
    ctx: &RequestContext,
    tenant_id: TenantId,
    id: D::Id,
) -> Result<Option<D>, StoreError>
where
    D: Document,
    S: DocumentStore<D> + ?Sized,
{
    match store.get(ctx, tenant_id, id) {
        Ok(doc) => Ok(Some(doc)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
