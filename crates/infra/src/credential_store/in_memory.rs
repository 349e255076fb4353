use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

use warden_core::{Clock, RequestContext, SystemClock};

use super::r#trait::{CredentialStore, StoreError};

#[derive(Debug, Clone)]
enum Value {
    String(String),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: DateTime<Utc>,
}

/// In-memory credential store with lazy expiry.
///
/// Intended for tests/dev. Expired keys are dropped on access, so behaviour
/// under a [`warden_core::ManualClock`] matches a real TTL store.
pub struct InMemoryCredentialStore {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl core::fmt::Debug for InMemoryCredentialStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryCredentialStore").finish_non_exhaustive()
    }
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .read()
            .map(|m| m.values().filter(|e| e.expires_at > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        self.clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn live<'a>(&self, map: &'a HashMap<String, Entry>, key: &str) -> Option<&'a Entry> {
        let now = self.clock.now();
        map.get(key).filter(|e| e.expires_at > now)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.entries
            .write()
            .map_err(|_| StoreError::Unavailable("credential store lock poisoned".into()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.entries
            .read()
            .map_err(|_| StoreError::Unavailable("credential store lock poisoned".into()))
    }
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        detail: "operation against a key holding the wrong kind of value".into(),
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn get(&self, ctx: &RequestContext, key: &str) -> Result<Option<String>, StoreError> {
        ctx.check()?;
        let map = self.read()?;
        match self.live(&map, key) {
            None => Ok(None),
            Some(Entry {
                value: Value::String(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn set(&self, ctx: &RequestContext, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        ctx.check()?;
        let expires_at = self.expiry(ttl);
        self.write()?.insert(
            key.to_string(),
            Entry {
                value: Value::String(value.to_string()),
                expires_at,
            },
        );
        Ok(())
    }

    fn delete(&self, ctx: &RequestContext, key: &str) -> Result<bool, StoreError> {
        ctx.check()?;
        let now = self.clock.now();
        Ok(self
            .write()?
            .remove(key)
            .is_some_and(|e| e.expires_at > now))
    }

    fn scan_prefix(&self, ctx: &RequestContext, prefix: &str) -> Result<Vec<String>, StoreError> {
        ctx.check()?;
        let now = self.clock.now();
        let mut keys: Vec<String> = self
            .read()?
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && e.expires_at > now)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn set_add(&self, ctx: &RequestContext, key: &str, member: &str, ttl: Duration) -> Result<(), StoreError> {
        ctx.check()?;
        let now = self.clock.now();
        let expires_at = self.expiry(ttl);
        let mut map = self.write()?;

        let entry = map.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(BTreeSet::new()),
            expires_at,
        });
        if entry.expires_at <= now {
            *entry = Entry {
                value: Value::Set(BTreeSet::new()),
                expires_at,
            };
        }
        match &mut entry.value {
            Value::Set(members) => {
                members.insert(member.to_string());
            }
            Value::String(_) => return Err(wrong_type(key)),
        }
        entry.expires_at = entry.expires_at.max(expires_at);
        Ok(())
    }

    fn set_remove(&self, ctx: &RequestContext, key: &str, member: &str) -> Result<bool, StoreError> {
        ctx.check()?;
        let now = self.clock.now();
        let mut map = self.write()?;
        let Some(entry) = map.get_mut(key).filter(|e| e.expires_at > now) else {
            return Ok(false);
        };
        let removed = match &mut entry.value {
            Value::Set(members) => members.remove(member),
            Value::String(_) => return Err(wrong_type(key)),
        };
        if matches!(&entry.value, Value::Set(m) if m.is_empty()) {
            map.remove(key);
        }
        Ok(removed)
    }

    fn set_members(&self, ctx: &RequestContext, key: &str) -> Result<Vec<String>, StoreError> {
        ctx.check()?;
        let map = self.read()?;
        match self.live(&map, key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{Interrupted, ManualClock};

    fn store() -> (Arc<ManualClock>, InMemoryCredentialStore) {
        let clock = Arc::new(ManualClock::default());
        let store = InMemoryCredentialStore::with_clock(clock.clone());
        (clock, store)
    }

    #[test]
    fn values_expire_with_their_ttl() {
        let (clock, store) = store();
        let ctx = RequestContext::background();
        store.set(&ctx, "k", "v", Duration::from_secs(60)).unwrap();
        assert_eq!(store.get(&ctx, "k").unwrap().as_deref(), Some("v"));

        clock.advance(chrono::Duration::seconds(60));
        assert_eq!(store.get(&ctx, "k").unwrap(), None);
        assert!(store.scan_prefix(&ctx, "k").unwrap().is_empty());
    }

    #[test]
    fn set_ttl_is_extended_never_shortened() {
        let (clock, store) = store();
        let ctx = RequestContext::background();
        store.set_add(&ctx, "idx", "a", Duration::from_secs(600)).unwrap();
        store.set_add(&ctx, "idx", "b", Duration::from_secs(60)).unwrap();

        clock.advance(chrono::Duration::seconds(120));
        assert_eq!(store.set_members(&ctx, "idx").unwrap(), vec!["a", "b"]);

        clock.advance(chrono::Duration::seconds(600));
        assert!(store.set_members(&ctx, "idx").unwrap().is_empty());
    }

    #[test]
    fn scan_matches_prefix_only() {
        let (_clock, store) = store();
        let ctx = RequestContext::background();
        let ttl = Duration::from_secs(60);
        store.set(&ctx, "tokens:t1:u1", "a", ttl).unwrap();
        store.set(&ctx, "tokens:t2:u1", "b", ttl).unwrap();
        store.set(&ctx, "refresh_tokens:t1:u1:x", "c", ttl).unwrap();
        assert_eq!(store.scan_prefix(&ctx, "tokens:t1:").unwrap(), vec!["tokens:t1:u1"]);
    }

    #[test]
    fn cancelled_context_blocks_writes() {
        let (_clock, store) = store();
        let ctx = RequestContext::background();
        ctx.cancel();
        let err = store.set(&ctx, "k", "v", Duration::from_secs(1)).unwrap_err();
        assert_eq!(err, StoreError::Interrupted(Interrupted::Cancelled));
        assert!(store.is_empty());
    }

    #[test]
    fn removing_last_member_drops_the_set() {
        let (_clock, store) = store();
        let ctx = RequestContext::background();
        store.set_add(&ctx, "idx", "a", Duration::from_secs(60)).unwrap();
        assert!(store.set_remove(&ctx, "idx", "a").unwrap());
        assert!(!store.set_remove(&ctx, "idx", "a").unwrap());
        assert!(store.is_empty());
    }
}
