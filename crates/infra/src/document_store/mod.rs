//! Document collections for tenants, users, roles and permissions.

#[cfg(test)]
pub(crate) mod faulty;
pub mod in_memory;
pub mod r#trait;

use std::sync::Arc;

use warden_auth::{Permission, Role, Tenant, User};
use warden_core::{PermissionId, RoleId, TenantId, UserId};

pub use in_memory::InMemoryDocumentStore;
pub use r#trait::{Document, DocumentStore, get_optional};

/// Unique-key builders shared by stores and lookups.
pub mod unique {
    use warden_core::TenantId;

    pub fn tenant_name(name: &str) -> String {
        format!("tenant_name:{}", name.trim().to_lowercase())
    }

    pub fn user_email(tenant_id: TenantId, email: &str) -> String {
        format!("{tenant_id}:email:{}", email.trim().to_lowercase())
    }

    pub fn user_username(tenant_id: TenantId, username: &str) -> String {
        format!("{tenant_id}:username:{}", username.trim())
    }

    pub fn role_slug(tenant_id: TenantId, slug: &str) -> String {
        format!("{tenant_id}:role:{slug}")
    }

    pub fn permission_string(tenant_id: TenantId, permission: &str) -> String {
        format!("{tenant_id}:permission:{permission}")
    }
}

impl Document for Tenant {
    type Id = TenantId;
    const KIND: &'static str = "tenant";

    fn id(&self) -> TenantId {
        self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.id
    }

    fn unique_keys(&self) -> Vec<String> {
        vec![unique::tenant_name(&self.name)]
    }
}

impl Document for User {
    type Id = UserId;
    const KIND: &'static str = "user";

    fn id(&self) -> UserId {
        self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn unique_keys(&self) -> Vec<String> {
        vec![
            unique::user_email(self.tenant_id, &self.email),
            unique::user_username(self.tenant_id, &self.username),
        ]
    }

    fn version(&self) -> Option<u64> {
        Some(self.version)
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl Document for Role {
    type Id = RoleId;
    const KIND: &'static str = "role";

    fn id(&self) -> RoleId {
        self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn unique_keys(&self) -> Vec<String> {
        vec![unique::role_slug(self.tenant_id, &self.slug)]
    }
}

impl Document for Permission {
    type Id = PermissionId;
    const KIND: &'static str = "permission";

    fn id(&self) -> PermissionId {
        self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn unique_keys(&self) -> Vec<String> {
        vec![unique::permission_string(
            self.tenant_id,
            self.permission_string.as_str(),
        )]
    }
}

pub type TenantStore = Arc<dyn DocumentStore<Tenant>>;
pub type UserStore = Arc<dyn DocumentStore<User>>;
pub type RoleStore = Arc<dyn DocumentStore<Role>>;
pub type PermissionStore = Arc<dyn DocumentStore<Permission>>;

/// The four collections, shared by every component that reads or writes them.
#[derive(Clone)]
pub struct Repositories {
    pub tenants: TenantStore,
    pub users: UserStore,
    pub roles: RoleStore,
    pub permissions: PermissionStore,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            tenants: Arc::new(InMemoryDocumentStore::<Tenant>::new()),
            users: Arc::new(InMemoryDocumentStore::<User>::new()),
            roles: Arc::new(InMemoryDocumentStore::<Role>::new()),
            permissions: Arc::new(InMemoryDocumentStore::<Permission>::new()),
        }
    }
}

impl core::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
