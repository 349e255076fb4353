//! Authorization boundary in front of every identity operation.
//!
//! Each method turns a `(resource, action)` pair and the *target* tenant into a
//! permission check, then delegates. Nothing below this layer asks who the
//! caller is. The check always runs before any lookup, so a denial says nothing
//! about whether the target exists.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{info, instrument, warn};

use warden_auth::{
    Action, NewTenant, NewUser, PermissionString, ResourceType, Role, Tenant, TenantStatus, TenantUpdate, TokenPair,
    TokenSubject, User, UserStatus,
};
use warden_core::{
    AppError, AppResult, AuthErrorKind, Clock, RequestContext, RoleId, SystemIdentity, TenantId, UserId,
};
use warden_infra::{
    PermissionResolutionEngine, Repositories, ResourceId, ResourceKind, ResourcePayload, ResourceRecord,
    ResourceUpdate, RevocationSummary, TeardownReport, TenantDefaults, TenantDirectory, TenantProvisioningSaga,
    TenantTeardown, TokenLifecycleManager, UserDirectory,
};

use crate::context::Caller;

/// Result of a successful password login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub tokens: TokenPair,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogoutOutcome {
    pub access_revoked: bool,
    pub refresh_revoked: bool,
}

pub struct AuthorizationFacade {
    tokens: Arc<TokenLifecycleManager>,
    engine: PermissionResolutionEngine,
    users: Arc<UserDirectory>,
    tenants: TenantDirectory,
    saga: TenantProvisioningSaga,
    teardown: TenantTeardown,
    clock: Arc<dyn Clock>,
}

impl core::fmt::Debug for AuthorizationFacade {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthorizationFacade")
            .field("system", self.engine.system())
            .finish_non_exhaustive()
    }
}

fn is_denial(err: &AppError) -> bool {
    err.auth_kind().is_some_and(|kind| kind.is_forbidden())
}

impl AuthorizationFacade {
    pub fn new(
        repos: &Repositories,
        tokens: Arc<TokenLifecycleManager>,
        users: Arc<UserDirectory>,
        saga: TenantProvisioningSaga,
        clock: Arc<dyn Clock>,
        system: SystemIdentity,
    ) -> Self {
        Self {
            engine: PermissionResolutionEngine::new(repos, clock.clone(), system),
            tenants: TenantDirectory::new(repos, clock.clone()),
            teardown: TenantTeardown::new(repos.clone(), tokens.clone()),
            tokens,
            users,
            saga,
            clock,
        }
    }

    pub fn system(&self) -> &SystemIdentity {
        self.engine.system()
    }

    fn require(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        resource: ResourceType,
        action: Action,
        target_tenant: TenantId,
    ) -> AppResult<()> {
        let required = PermissionString::of(resource, action);
        self.engine
            .authorize(ctx, caller.tenant_id(), caller.user_id(), &required, target_tenant)?;
        Ok(())
    }

    /// Callers may always inspect themselves; anyone else needs `user:read`.
    fn require_self_or_reader(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> AppResult<()> {
        if caller.is(tenant_id, user_id) {
            return Ok(());
        }
        self.require(ctx, caller, ResourceType::User, Action::Read, tenant_id)
    }

    fn subject_for(&self, user: &User) -> TokenSubject {
        TokenSubject {
            tenant_id: user.tenant_id,
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            roles: user.live_role_ids(self.clock.now()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authentication
    // ─────────────────────────────────────────────────────────────────────────

    /// Password login. An unknown tenant fails exactly like a wrong password.
    #[instrument(skip(self, ctx, password), fields(tenant_id = %tenant_id), err)]
    pub fn login(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        login: &str,
        password: &str,
    ) -> AppResult<LoginOutcome> {
        let tenant = match self.tenants.get_tenant(ctx, tenant_id) {
            Ok(tenant) => tenant,
            Err(e) if e.is_not_found() => return Err(AppError::auth(AuthErrorKind::InvalidCredentials)),
            Err(e) => return Err(e),
        };
        let user = self.users.authenticate(ctx, tenant_id, login, password)?;
        if matches!(tenant.status, TenantStatus::Suspended | TenantStatus::Inactive) {
            info!(target: "audit", tenant_id = %tenant_id, user_id = %user.id, status = ?tenant.status, "login refused for inactive tenant");
            return Err(AppError::auth(AuthErrorKind::AccountDisabled));
        }
        let tokens = self.tokens.issue_pair(ctx, &self.subject_for(&user), Vec::new())?;
        Ok(LoginOutcome { user, tokens })
    }

    /// Resolve a presented access token into a caller.
    pub fn authenticate(&self, ctx: &RequestContext, access_token: &str) -> AppResult<Caller> {
        Ok(self.tokens.validate_access_token(ctx, access_token)?.into())
    }

    /// Soft-revoke the caller's access token and, if given, one of their refresh tokens.
    pub fn logout(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> AppResult<LogoutOutcome> {
        let access_revoked = self
            .tokens
            .revoke_access_token(ctx, access_token, Some(caller.user_id()))?;
        let refresh_revoked = match refresh_token {
            Some(token) => self.tokens.revoke_refresh_token(
                ctx,
                caller.tenant_id(),
                caller.user_id(),
                token,
                Some(caller.user_id()),
                false,
            )?,
            None => false,
        };
        Ok(LogoutOutcome {
            access_revoked,
            refresh_revoked,
        })
    }

    /// Exchange a refresh token for a new pair. The presented token is spent.
    pub fn refresh(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
        refresh_token: &str,
    ) -> AppResult<TokenPair> {
        let user = match self.users.get_user(ctx, tenant_id, user_id) {
            Ok(user) => user,
            Err(e) if e.is_not_found() => return Err(AppError::auth(AuthErrorKind::TokenInvalid)),
            Err(e) => return Err(e),
        };
        if !user.is_active() {
            return Err(AppError::auth(AuthErrorKind::AccountDisabled));
        }
        self.tokens
            .rotate_refresh_token(ctx, &self.subject_for(&user), refresh_token, Some(user_id))
    }

    /// Revoke any access token. Someone else's token needs `token:delete` in its tenant.
    pub fn revoke_token(&self, ctx: &RequestContext, caller: &Caller, access_token: &str) -> AppResult<bool> {
        let claims = self.tokens.decode_access_token(access_token)?;
        if !caller.is(claims.tenant_id, claims.sub) {
            self.require(ctx, caller, ResourceType::Token, Action::Delete, claims.tenant_id)?;
        }
        self.tokens
            .revoke_access_token(ctx, access_token, Some(caller.user_id()))
    }

    pub fn revoke_user_tokens(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> AppResult<RevocationSummary> {
        if !caller.is(tenant_id, user_id) {
            self.require(ctx, caller, ResourceType::Token, Action::Delete, tenant_id)?;
        }
        self.tokens
            .revoke_all_for_user(ctx, tenant_id, user_id, Some(caller.user_id()))
    }

    pub fn revoke_all_tenant_tokens(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
    ) -> AppResult<RevocationSummary> {
        self.require(ctx, caller, ResourceType::Token, Action::Delete, tenant_id)?;
        self.tokens.revoke_all_for_tenant(
            ctx,
            tenant_id,
            Some(caller.user_id()),
            warden_auth::RevokeReason::Administrative,
        )
    }

    /// Remove a user's access record outright. Same gate as revocation.
    pub fn delete_access_token(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> AppResult<bool> {
        if !caller.is(tenant_id, user_id) {
            self.require(ctx, caller, ResourceType::Token, Action::Delete, tenant_id)?;
        }
        let deleted = self.tokens.delete_access_token(ctx, tenant_id, user_id)?;
        if deleted {
            info!(target: "audit", tenant_id = %tenant_id, user_id = %user_id, by = %caller.user_id(), "access token deleted");
        }
        Ok(deleted)
    }

    pub fn delete_refresh_token(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        user_id: UserId,
        refresh_token: &str,
    ) -> AppResult<bool> {
        if !caller.is(tenant_id, user_id) {
            self.require(ctx, caller, ResourceType::Token, Action::Delete, tenant_id)?;
        }
        let deleted = self
            .tokens
            .delete_refresh_token(ctx, tenant_id, user_id, refresh_token)?;
        if deleted {
            info!(target: "audit", tenant_id = %tenant_id, user_id = %user_id, by = %caller.user_id(), "refresh token deleted");
        }
        Ok(deleted)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permission queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn check_permissions(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        user_id: UserId,
        permissions: &[String],
    ) -> AppResult<BTreeMap<String, bool>> {
        self.require_self_or_reader(ctx, caller, tenant_id, user_id)?;
        self.engine.check_permissions(ctx, tenant_id, user_id, permissions)
    }

    /// `Ok(false)` when the subject lacks the permission; errors are kept for bad input.
    pub fn has_permission(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        user_id: UserId,
        permission: &str,
        target_tenant: Option<TenantId>,
    ) -> AppResult<bool> {
        self.require_self_or_reader(ctx, caller, tenant_id, user_id)?;
        match self
            .engine
            .has_permission(ctx, tenant_id, user_id, permission, target_tenant.unwrap_or(tenant_id))
        {
            Ok(_) => Ok(true),
            Err(e) if is_denial(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn user_permissions(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> AppResult<Vec<String>> {
        self.require_self_or_reader(ctx, caller, tenant_id, user_id)?;
        let effective = self.engine.effective_permissions(ctx, tenant_id, user_id)?;
        Ok(effective.effective().into_iter().map(|p| p.as_str().to_string()).collect())
    }

    pub fn user_roles(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> AppResult<Vec<Role>> {
        self.require_self_or_reader(ctx, caller, tenant_id, user_id)?;
        self.engine.user_roles(ctx, tenant_id, user_id)
    }

    /// Membership check keyed by the ids or permission strings as given.
    pub fn verify_user_resource(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        user_id: UserId,
        kind: ResourceKind,
        values: &[String],
    ) -> AppResult<BTreeMap<String, bool>> {
        self.require_self_or_reader(ctx, caller, tenant_id, user_id)?;
        match kind {
            ResourceKind::Role => {
                let ids = values
                    .iter()
                    .map(|raw| raw.parse::<RoleId>())
                    .collect::<AppResult<Vec<_>>>()?;
                let held = self.engine.verify_user_roles(ctx, tenant_id, user_id, &ids)?;
                Ok(values
                    .iter()
                    .zip(&ids)
                    .map(|(raw, id)| (raw.clone(), held.get(id).copied().unwrap_or(false)))
                    .collect())
            }
            ResourceKind::Permission => self.engine.check_permissions(ctx, tenant_id, user_id, values),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Roles and permissions
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_resource(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        kind: ResourceKind,
        data: JsonValue,
    ) -> AppResult<ResourceRecord> {
        self.require(ctx, caller, kind.resource_type(), Action::Create, tenant_id)?;
        let payload = ResourcePayload::extract(kind, data)?;
        self.engine
            .create_resource(ctx, tenant_id, payload, Some(caller.user_id()))
    }

    pub fn get_resource(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        kind: ResourceKind,
        id: &str,
    ) -> AppResult<ResourceRecord> {
        self.require(ctx, caller, kind.resource_type(), Action::Read, tenant_id)?;
        self.engine.get_resource(ctx, tenant_id, ResourceId::parse(kind, id)?)
    }

    pub fn list_resources(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        kind: ResourceKind,
    ) -> AppResult<Vec<ResourceRecord>> {
        self.require(ctx, caller, kind.resource_type(), Action::Read, tenant_id)?;
        self.engine.list_resources(ctx, tenant_id, kind)
    }

    pub fn update_resource(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        kind: ResourceKind,
        id: &str,
        data: JsonValue,
    ) -> AppResult<ResourceRecord> {
        self.require(ctx, caller, kind.resource_type(), Action::Update, tenant_id)?;
        let id = ResourceId::parse(kind, id)?;
        let update = ResourceUpdate::extract(kind, data)?;
        self.engine.update_resource(ctx, tenant_id, id, update)
    }

    pub fn delete_resource(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        kind: ResourceKind,
        id: &str,
    ) -> AppResult<bool> {
        self.require(ctx, caller, kind.resource_type(), Action::Delete, tenant_id)?;
        self.engine.delete_resource(ctx, tenant_id, ResourceId::parse(kind, id)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_user(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        new_user: NewUser,
    ) -> AppResult<User> {
        self.require(ctx, caller, ResourceType::User, Action::Create, tenant_id)?;
        if !new_user.roles.is_empty() {
            self.require(ctx, caller, ResourceType::User, Action::Role, tenant_id)?;
        }
        self.users
            .create_user(ctx, tenant_id, new_user, Some(caller.user_id()))
    }

    pub fn get_user(&self, ctx: &RequestContext, caller: &Caller, tenant_id: TenantId, user_id: UserId) -> AppResult<User> {
        self.require_self_or_reader(ctx, caller, tenant_id, user_id)?;
        self.users.get_user(ctx, tenant_id, user_id)
    }

    pub fn list_users(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        status: Option<UserStatus>,
    ) -> AppResult<Vec<User>> {
        self.require(ctx, caller, ResourceType::User, Action::Read, tenant_id)?;
        self.users.list_users(ctx, tenant_id, status)
    }

    /// Leaving the active state also revokes the user's tokens, best effort.
    pub fn update_user_status(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        user_id: UserId,
        status: UserStatus,
    ) -> AppResult<User> {
        self.require(ctx, caller, ResourceType::User, Action::Update, tenant_id)?;
        let user = self.users.update_status(ctx, tenant_id, user_id, status)?;
        if !user.is_active() {
            self.revoke_quietly(ctx, caller, tenant_id, user_id);
        }
        Ok(user)
    }

    /// The seeded system administrator cannot be deleted.
    pub fn delete_user(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> AppResult<bool> {
        self.require(ctx, caller, ResourceType::User, Action::Delete, tenant_id)?;
        if user_id == self.system().admin_user_id() {
            return Err(AppError::business("the system administrator cannot be deleted"));
        }
        self.revoke_quietly(ctx, caller, tenant_id, user_id);
        self.users.delete_user(ctx, tenant_id, user_id)
    }

    fn revoke_quietly(&self, ctx: &RequestContext, caller: &Caller, tenant_id: TenantId, user_id: UserId) {
        if let Err(e) = self
            .tokens
            .revoke_all_for_user(ctx, tenant_id, user_id, Some(caller.user_id()))
        {
            warn!(tenant_id = %tenant_id, user_id = %user_id, error = %e, "failed to revoke tokens of deactivated user");
        }
    }

    pub fn assign_role(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<User> {
        self.require(ctx, caller, ResourceType::User, Action::Role, tenant_id)?;
        self.users
            .assign_role(ctx, tenant_id, user_id, role_id, Some(caller.user_id()), expires_at)
    }

    pub fn unassign_role(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<bool> {
        self.require(ctx, caller, ResourceType::User, Action::Role, tenant_id)?;
        self.users.unassign_role(ctx, tenant_id, user_id, role_id)
    }

    pub fn grant_permission(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        user_id: UserId,
        permission: &str,
    ) -> AppResult<User> {
        self.require(ctx, caller, ResourceType::User, Action::Permission, tenant_id)?;
        self.users.grant_permission(ctx, tenant_id, user_id, permission)
    }

    pub fn withdraw_permission(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        user_id: UserId,
        permission: &str,
    ) -> AppResult<bool> {
        self.require(ctx, caller, ResourceType::User, Action::Permission, tenant_id)?;
        self.users.withdraw_permission(ctx, tenant_id, user_id, permission)
    }

    pub fn deny_permission(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        user_id: UserId,
        permission: &str,
    ) -> AppResult<User> {
        self.require(ctx, caller, ResourceType::User, Action::Permission, tenant_id)?;
        self.users.deny_permission(ctx, tenant_id, user_id, permission)
    }

    pub fn lift_denial(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        user_id: UserId,
        permission: &str,
    ) -> AppResult<bool> {
        self.require(ctx, caller, ResourceType::User, Action::Permission, tenant_id)?;
        self.users.lift_denial(ctx, tenant_id, user_id, permission)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tenants
    // ─────────────────────────────────────────────────────────────────────────

    /// Creating tenants is a system-tenant privilege: checked against the system tenant.
    pub fn create_tenant(&self, ctx: &RequestContext, caller: &Caller, new_tenant: NewTenant) -> AppResult<TenantDefaults> {
        self.require(ctx, caller, ResourceType::Tenant, Action::Create, self.system().tenant_id())?;
        self.saga.provision(ctx, new_tenant, Some(caller.user_id()))
    }

    pub fn get_tenant(&self, ctx: &RequestContext, caller: &Caller, tenant_id: TenantId) -> AppResult<Tenant> {
        self.require(ctx, caller, ResourceType::Tenant, Action::Read, tenant_id)?;
        self.tenants.get_tenant(ctx, tenant_id)
    }

    /// System callers see every tenant; anyone else at most their own.
    pub fn list_tenants(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        status: Option<TenantStatus>,
    ) -> AppResult<Vec<Tenant>> {
        let own = caller.tenant_id();
        self.require(ctx, caller, ResourceType::Tenant, Action::Read, own)?;
        if self.system().is_system_tenant(own) {
            return self.tenants.list_tenants(ctx, status);
        }
        let tenant = self.tenants.get_tenant(ctx, own)?;
        Ok(status
            .is_none_or(|s| s == tenant.status)
            .then_some(tenant)
            .into_iter()
            .collect())
    }

    pub fn update_tenant(
        &self,
        ctx: &RequestContext,
        caller: &Caller,
        tenant_id: TenantId,
        update: TenantUpdate,
    ) -> AppResult<Tenant> {
        self.require(ctx, caller, ResourceType::Tenant, Action::Update, tenant_id)?;
        if self.system().is_system_tenant(tenant_id)
            && update.status.is_some_and(|s| s != TenantStatus::Active)
        {
            return Err(AppError::business("the system tenant cannot be deactivated"));
        }
        self.tenants.update_tenant(ctx, tenant_id, update)
    }

    pub fn delete_tenant(&self, ctx: &RequestContext, caller: &Caller, tenant_id: TenantId) -> AppResult<TeardownReport> {
        self.require(ctx, caller, ResourceType::Tenant, Action::Delete, tenant_id)?;
        if self.system().is_system_tenant(tenant_id) {
            return Err(AppError::business("the system tenant cannot be deleted"));
        }
        self.teardown.delete_tenant(ctx, tenant_id, Some(caller.user_id()))
    }
}
