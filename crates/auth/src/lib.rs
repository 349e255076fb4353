//! Identity and authorization domain model.
//!
//! Pure types and policy: tenants, users, roles, permissions, credential
//! records and the rules that combine them. Nothing here performs IO.

pub mod authorize;
pub mod claims;
pub mod credentials;
pub mod password;
pub mod permissions;
pub mod roles;
pub mod tenant;
pub mod user;

pub use authorize::{Decision, DenialKind, EffectivePermissions, GrantKind, live_role_grants};
pub use claims::{AccessTokenClaims, JwtCodec, TokenValidationError, token_digest, validate_claims};
pub use credentials::{
    AccessTokenRecord, CredentialRecord, IssuedAccessToken, IssuedRefreshToken, RefreshTokenRecord, RevokeReason,
    Revocation, TokenPair, TokenSubject, generate_refresh_token,
};
pub use password::{Argon2Hasher, PasswordHasher, PasswordPolicy, generate_password};
pub use permissions::{
    Action, NewPermission, Permission, PermissionString, PermissionUpdate, RecordStatus,
    ResourceType,
};
pub use roles::{NewRole, Role, RoleAssignment, RoleUpdate};
pub use tenant::{NewTenant, Tenant, TenantStatus, TenantUpdate};
pub use user::{LoginRecord, NewUser, User, UserStatus};
