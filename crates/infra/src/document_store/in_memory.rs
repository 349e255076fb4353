use std::collections::HashMap;
use std::sync::RwLock;

use warden_core::{RequestContext, TenantId};

use super::r#trait::{Document, DocumentStore};
use crate::credential_store::StoreError;

/// In-memory document collection for tests/dev.
pub struct InMemoryDocumentStore<D: Document> {
    inner: RwLock<HashMap<(TenantId, D::Id), D>>,
}

impl<D: Document> core::fmt::Debug for InMemoryDocumentStore<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryDocumentStore")
            .field("kind", &D::KIND)
            .finish_non_exhaustive()
    }
}

impl<D: Document> InMemoryDocumentStore<D> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable(format!("{} store lock poisoned", D::KIND))
    }

    /// First unique key of `doc` already held by a different record.
    fn taken_key(map: &HashMap<(TenantId, D::Id), D>, doc: &D) -> Option<String> {
        let wanted = doc.unique_keys();
        map.values()
            .filter(|other| other.id() != doc.id())
            .flat_map(|other| other.unique_keys())
            .find(|k| wanted.contains(k))
    }
}

impl<D: Document> Default for InMemoryDocumentStore<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Document> DocumentStore<D> for InMemoryDocumentStore<D> {
    fn insert(&self, ctx: &RequestContext, doc: D) -> Result<D, StoreError> {
        ctx.check()?;
        let mut map = self.inner.write().map_err(|_| Self::poisoned())?;
        let key = (doc.tenant_id(), doc.id());
        if map.contains_key(&key) {
            return Err(StoreError::Conflict(format!("{} {}", D::KIND, doc.id())));
        }
        if let Some(taken) = Self::taken_key(&map, &doc) {
            return Err(StoreError::Conflict(format!("{} ({taken})", D::KIND)));
        }
        map.insert(key, doc.clone());
        Ok(doc)
    }

    fn get(&self, ctx: &RequestContext, tenant_id: TenantId, id: D::Id) -> Result<D, StoreError> {
        ctx.check()?;
        let map = self.inner.read().map_err(|_| Self::poisoned())?;
        map.get(&(tenant_id, id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{} {id}", D::KIND)))
    }

    fn replace(&self, ctx: &RequestContext, mut doc: D) -> Result<D, StoreError> {
        ctx.check()?;
        let mut map = self.inner.write().map_err(|_| Self::poisoned())?;
        let key = (doc.tenant_id(), doc.id());
        let Some(stored) = map.get(&key) else {
            return Err(StoreError::NotFound(format!("{} {}", D::KIND, doc.id())));
        };
        if let Some(expected) = doc.version() {
            if stored.version() != Some(expected) {
                return Err(StoreError::Stale(format!("{} {}", D::KIND, doc.id())));
            }
            doc.set_version(expected + 1);
        }
        if let Some(taken) = Self::taken_key(&map, &doc) {
            return Err(StoreError::Conflict(format!("{} ({taken})", D::KIND)));
        }
        map.insert(key, doc.clone());
        Ok(doc)
    }

    fn delete(&self, ctx: &RequestContext, tenant_id: TenantId, id: D::Id) -> Result<bool, StoreError> {
        ctx.check()?;
        let mut map = self.inner.write().map_err(|_| Self::poisoned())?;
        Ok(map.remove(&(tenant_id, id)).is_some())
    }

    fn list(&self, ctx: &RequestContext, tenant_id: TenantId) -> Result<Vec<D>, StoreError> {
        ctx.check()?;
        let map = self.inner.read().map_err(|_| Self::poisoned())?;
        let mut docs: Vec<D> = map
            .iter()
            .filter_map(|((t, _), d)| if *t == tenant_id { Some(d.clone()) } else { None })
            .collect();
        docs.sort_by_key(|d| d.id());
        Ok(docs)
    }

    fn list_all(&self, ctx: &RequestContext) -> Result<Vec<D>, StoreError> {
        ctx.check()?;
        let map = self.inner.read().map_err(|_| Self::poisoned())?;
        let mut docs: Vec<D> = map.values().cloned().collect();
        docs.sort_by_key(|d| d.id());
        Ok(docs)
    }

    fn find_unique(&self, ctx: &RequestContext, key: &str) -> Result<Option<D>, StoreError> {
        ctx.check()?;
        let map = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(map
            .values()
            .find(|d| d.unique_keys().iter().any(|k| k == key))
            .cloned())
    }

    fn delete_by_tenant(&self, ctx: &RequestContext, tenant_id: TenantId) -> Result<usize, StoreError> {
        ctx.check()?;
        let mut map = self.inner.write().map_err(|_| Self::poisoned())?;
        let before = map.len();
        map.retain(|(t, _), _| *t != tenant_id);
        Ok(before - map.len())
    }
}
