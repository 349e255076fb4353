//! Redis-backed credential store.
//!
//! Plain values use `SET .. EX`, index sets use `SADD`/`SREM`/`SMEMBERS`, and
//! prefix enumeration walks the keyspace with `SCAN .. MATCH`. A fresh
//! connection is taken per call; the client itself is cheap to share.

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use warden_core::RequestContext;

use super::r#trait::{CredentialStore, StoreError};

/// Keys examined per SCAN round trip.
const DEFAULT_SCAN_COUNT: usize = 500;

#[derive(Debug, Clone)]
pub struct RedisCredentialStore {
    client: Arc<redis::Client>,
    scan_count: usize,
}

impl RedisCredentialStore {
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self {
            client: Arc::new(client),
            scan_count: DEFAULT_SCAN_COUNT,
        })
    }

    fn connection(&self, ctx: &RequestContext) -> Result<redis::Connection, StoreError> {
        ctx.check()?;
        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        if let Some(deadline) = ctx.deadline() {
            let left = deadline.saturating_duration_since(std::time::Instant::now());
            let left = left.max(Duration::from_millis(1));
            conn.set_read_timeout(Some(left))
                .and_then(|_| conn.set_write_timeout(Some(left)))
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }
        Ok(conn)
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn command_error(e: redis::RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// `current` is the reply to `TTL`: -1 for a key SADD just created without
/// expiry, otherwise the remaining seconds. The deadline only ever moves later.
fn needs_expire(current: i64, wanted: i64) -> bool {
    current < wanted
}

/// Escape glob metacharacters so a key prefix matches literally.
fn escape_glob(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('*');
    out
}

impl CredentialStore for RedisCredentialStore {
    fn get(&self, ctx: &RequestContext, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection(ctx)?;
        redis::cmd("GET").arg(key).query(&mut conn).map_err(command_error)
    }

    #[instrument(skip(self, ctx, value), fields(key = %key), err)]
    fn set(&self, ctx: &RequestContext, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection(ctx)?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query(&mut conn)
            .map_err(command_error)
    }

    fn delete(&self, ctx: &RequestContext, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection(ctx)?;
        let removed: i64 = redis::cmd("DEL").arg(key).query(&mut conn).map_err(command_error)?;
        Ok(removed > 0)
    }

    #[instrument(skip(self, ctx), fields(prefix = %prefix), err)]
    fn scan_prefix(&self, ctx: &RequestContext, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection(ctx)?;
        let pattern = escape_glob(prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            ctx.check()?;
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(self.scan_count)
                .query(&mut conn)
                .map_err(command_error)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    fn set_add(&self, ctx: &RequestContext, key: &str, member: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection(ctx)?;
        let wanted = ttl_secs(ttl) as i64;
        let (_, current): (i64, i64) = redis::pipe()
            .atomic()
            .cmd("SADD")
            .arg(key)
            .arg(member)
            .cmd("TTL")
            .arg(key)
            .query(&mut conn)
            .map_err(command_error)?;
        if needs_expire(current, wanted) {
            redis::cmd("EXPIRE")
                .arg(key)
                .arg(wanted)
                .query::<i64>(&mut conn)
                .map_err(command_error)?;
        }
        Ok(())
    }

    fn set_remove(&self, ctx: &RequestContext, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection(ctx)?;
        let removed: i64 = redis::cmd("SREM")
            .arg(key)
            .arg(member)
            .query(&mut conn)
            .map_err(command_error)?;
        Ok(removed > 0)
    }

    fn set_members(&self, ctx: &RequestContext, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection(ctx)?;
        let mut members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(key)
            .query(&mut conn)
            .map_err(command_error)?;
        members.sort();
        Ok(members)
    }
}
