//! Request/response shapes of the RPC surface.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use warden_auth::{NewUser, RoleAssignment, TenantStatus, TenantUpdate, TokenPair, User, UserStatus};
use warden_core::{RoleId, TenantId, UserId};
use warden_infra::ResourceKind;

use crate::context::Caller;

// ─────────────────────────────────────────────────────────────────────────────
// Auth
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub tenant_id: TenantId,
    /// Email or username.
    #[serde(alias = "email", alias = "username")]
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenPairResponse {
    pub token_type: &'static str,
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub tenant_id: TenantId,
    pub user_id: UserId,
}

impl From<TokenPair> for TokenPairResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            token_type: "Bearer",
            tenant_id: pair.access.record.tenant_id,
            user_id: pair.access.record.user_id,
            access_expires_at: pair.access.record.expires_at,
            access_token: pair.access.token,
            refresh_expires_at: pair.refresh.record.expires_at,
            refresh_token: pair.refresh.token,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPairResponse,
    pub user: UserView,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub access_revoked: bool,
    pub refresh_revoked: bool,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyTokenResponse {
    pub valid: bool,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub username: String,
    pub roles: Vec<RoleId>,
    pub expires_at: DateTime<Utc>,
}

impl From<&Caller> for VerifyTokenResponse {
    fn from(caller: &Caller) -> Self {
        Self {
            valid: true,
            tenant_id: caller.tenant_id(),
            user_id: caller.user_id(),
            username: caller.username().to_string(),
            roles: caller.roles().to_vec(),
            expires_at: caller.expires_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RevokedResponse {
    pub revoked: bool,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// RBAC
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TenantRef {
    pub tenant_id: TenantId,
}

#[derive(Debug, Deserialize)]
pub struct UserRef {
    pub tenant_id: TenantId,
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct CheckPermissionsRequest {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckPermissionsResponse {
    pub results: BTreeMap<String, bool>,
}

#[derive(Debug, Deserialize)]
pub struct HasPermissionRequest {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub permission: String,
    /// Defaults to the user's own tenant.
    #[serde(default)]
    pub target_tenant_id: Option<TenantId>,
}

#[derive(Debug, Serialize)]
pub struct HasPermissionResponse {
    pub allowed: bool,
}

#[derive(Debug, Serialize)]
pub struct PermissionsResponse {
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResourceRequest {
    pub tenant_id: TenantId,
    pub kind: ResourceKind,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub data: JsonValue,
}

#[derive(Debug, Deserialize)]
pub struct VerifyUserResourceRequest {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub kind: ResourceKind,
    /// Role ids or permission strings, depending on `kind`.
    pub ids: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

/// A user without credential material.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub email: String,
    pub username: String,
    pub status: UserStatus,
    pub roles: Vec<RoleAssignment>,
    pub additional_permissions: Vec<String>,
    pub revoked_permissions: Vec<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            tenant_id: user.tenant_id,
            email: user.email.clone(),
            username: user.username.clone(),
            status: user.status,
            roles: user.roles.clone(),
            additional_permissions: user.additional_permissions.iter().map(|p| p.as_str().to_string()).collect(),
            revoked_permissions: user.revoked_permissions.iter().map(|p| p.as_str().to_string()).collect(),
            last_login_at: user.last_successful_login(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub tenant_id: TenantId,
    #[serde(flatten)]
    pub user: NewUser,
}

#[derive(Debug, Deserialize)]
pub struct ListUsersRequest {
    pub tenant_id: TenantId,
    #[serde(default)]
    pub status: Option<UserStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserStatusRequest {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub status: UserStatus,
}

#[derive(Debug, Deserialize)]
pub struct RoleAssignmentRequest {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role_id: RoleId,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UserPermissionRequest {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub permission: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tenants
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListTenantsRequest {
    #[serde(default)]
    pub status: Option<TenantStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTenantRequest {
    pub tenant_id: TenantId,
    #[serde(flatten)]
    pub update: TenantUpdate,
}
