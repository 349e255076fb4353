//! Credential key-value store boundary.
//!
//! Token records and index sets live here; the document store holds everything
//! else. Only the operations the token lifecycle needs are modelled.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod r#trait;

pub use in_memory::InMemoryCredentialStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisCredentialStore;
pub use r#trait::{CredentialStore, StoreError};
