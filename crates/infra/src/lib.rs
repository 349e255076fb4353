//! Infrastructure layer: stores, token lifecycle, permission resolution and
//! the tenant workflows built on top of them.

pub mod bootstrap;
pub mod credential_store;
pub mod document_store;
pub mod rbac;
pub mod saga;
pub mod tenants;
pub mod tokens;
pub mod users;

pub use bootstrap::{Bootstrapped, SystemAdminSeed, seed_system_tenant};
pub use credential_store::{CredentialStore, InMemoryCredentialStore, StoreError};
pub use document_store::{DocumentStore, InMemoryDocumentStore, Repositories};
pub use rbac::{PermissionResolutionEngine, ResourceId, ResourceKind, ResourcePayload, ResourceRecord, ResourceUpdate};
pub use saga::{TeardownReport, TenantDefaults, TenantProvisioningSaga, TenantTeardown};
pub use tenants::TenantDirectory;
pub use tokens::{RevocationSummary, TokenLifecycleManager, TokenSettings, ValidatedAccessToken};
pub use users::UserDirectory;
