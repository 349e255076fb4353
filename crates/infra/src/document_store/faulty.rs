//! In-memory collection that can be told to fail individual operations.

use std::sync::atomic::{AtomicBool, Ordering};

use warden_core::{RequestContext, TenantId};

use super::{Document, DocumentStore, InMemoryDocumentStore};
use crate::credential_store::StoreError;

pub(crate) struct FaultyStore<D: Document> {
    inner: InMemoryDocumentStore<D>,
    fail_insert: AtomicBool,
    fail_delete: AtomicBool,
    fail_delete_by_tenant: AtomicBool,
}

impl<D: Document> Default for FaultyStore<D> {
    fn default() -> Self {
        Self {
            inner: InMemoryDocumentStore::new(),
            fail_insert: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            fail_delete_by_tenant: AtomicBool::new(false),
        }
    }
}

impl<D: Document> FaultyStore<D> {
    pub(crate) fn failing_inserts() -> Self {
        let store = Self::default();
        store.fail_insert.store(true, Ordering::SeqCst);
        store
    }

    pub(crate) fn failing_deletes() -> Self {
        let store = Self::default();
        store.fail_delete.store(true, Ordering::SeqCst);
        store.fail_delete_by_tenant.store(true, Ordering::SeqCst);
        store
    }

    pub(crate) fn fail_delete_by_tenant(&self) {
        self.fail_delete_by_tenant.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_delete(&self) {
        self.fail_delete.store(true, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{} store down", D::KIND)));
        }
        Ok(())
    }
}

impl<D: Document> DocumentStore<D> for FaultyStore<D> {
    fn insert(&self, ctx: &RequestContext, doc: D) -> Result<D, StoreError> {
        Self::check(&self.fail_insert)?;
        self.inner.insert(ctx, doc)
    }

    fn get(&self, ctx: &RequestContext, tenant_id: TenantId, id: D::Id) -> Result<D, StoreError> {
        self.inner.get(ctx, tenant_id, id)
    }

    fn replace(&self, ctx: &RequestContext, doc: D) -> Result<D, StoreError> {
        self.inner.replace(ctx, doc)
    }

    fn delete(&self, ctx: &RequestContext, tenant_id: TenantId, id: D::Id) -> Result<bool, StoreError> {
        Self::check(&self.fail_delete)?;
        self.inner.delete(ctx, tenant_id, id)
    }

    fn list(&self, ctx: &RequestContext, tenant_id: TenantId) -> Result<Vec<D>, StoreError> {
        self.inner.list(ctx, tenant_id)
    }

    fn list_all(&self, ctx: &RequestContext) -> Result<Vec<D>, StoreError> {
        self.inner.list_all(ctx)
    }

    fn find_unique(&self, ctx: &RequestContext, key: &str) -> Result<Option<D>, StoreError> {
        self.inner.find_unique(ctx, key)
    }

    fn delete_by_tenant(&self, ctx: &RequestContext, tenant_id: TenantId) -> Result<usize, StoreError> {
        Self::check(&self.fail_delete_by_tenant)?;
        self.inner.delete_by_tenant(ctx, tenant_id)
    }
}
