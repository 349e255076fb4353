//! JSON request dispatch onto the auth, RBAC, user and tenant services.
//!
//! A request names a service and a method and carries JSON params plus, for
//! everything but `Login`, `RefreshToken` and `VerifyToken`, the caller's
//! access token. Every failure comes back as an [`ErrorBody`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tracing::debug;

use warden_auth::NewTenant;
use warden_core::{AppError, AppResult, AuthErrorKind, RequestContext};

use crate::context::Caller;
use crate::dto::*;
use crate::facade::AuthorizationFacade;
use crate::status::ErrorBody;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    /// Echoed back untouched.
    #[serde(default)]
    pub id: JsonValue,
    pub service: String,
    pub method: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub params: JsonValue,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    pub id: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl RpcResponse {
    fn from_outcome(id: JsonValue, outcome: AppResult<JsonValue>) -> Self {
        match outcome {
            Ok(result) => Self {
                id,
                result: Some(result),
                error: None,
            },
            Err(err) => Self {
                id,
                result: None,
                error: Some(ErrorBody::from(&err)),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

fn params<T: DeserializeOwned>(value: JsonValue) -> AppResult<T> {
    let value = match value {
        JsonValue::Null => JsonValue::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(value).map_err(|e| AppError::invalid_format(format!("invalid params: {e}")))
}

fn reply<T: Serialize>(value: T) -> AppResult<JsonValue> {
    serde_json::to_value(value).map_err(|e| AppError::internal(format!("failed to encode response: {e}")))
}

fn required<'a>(value: Option<&'a str>, field: &str) -> AppResult<&'a str> {
    value.ok_or_else(|| AppError::missing_field(field))
}

fn unknown_method(service: &str, method: &str) -> AppError {
    AppError::not_found(format!("method {service}.{method}"))
}

struct Authenticated<'a> {
    caller: Caller,
    token: &'a str,
}

fn authenticate<'a>(
    facade: &AuthorizationFacade,
    ctx: &RequestContext,
    token: Option<&'a str>,
) -> AppResult<Authenticated<'a>> {
    let token = token.ok_or(AppError::auth(AuthErrorKind::TokenInvalid))?;
    Ok(Authenticated {
        caller: facade.authenticate(ctx, token)?,
        token,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Services
// ─────────────────────────────────────────────────────────────────────────────

pub struct AuthService {
    facade: Arc<AuthorizationFacade>,
}

impl AuthService {
    pub fn handle(
        &self,
        ctx: &RequestContext,
        method: &str,
        token: Option<&str>,
        raw: JsonValue,
    ) -> AppResult<JsonValue> {
        let facade = &*self.facade;
        match method {
            "Login" => {
                let req: LoginRequest = params(raw)?;
                let outcome = facade.login(ctx, req.tenant_id, &req.login, &req.password)?;
                reply(LoginResponse {
                    user: UserView::from(&outcome.user),
                    tokens: outcome.tokens.into(),
                })
            }
            "RefreshToken" => {
                let req: RefreshRequest = params(raw)?;
                let pair = facade.refresh(ctx, req.tenant_id, req.user_id, &req.refresh_token)?;
                reply(TokenPairResponse::from(pair))
            }
            "VerifyToken" => {
                let req: TokenRequest = params(raw)?;
                let caller = facade.authenticate(ctx, &req.token)?;
                reply(VerifyTokenResponse::from(&caller))
            }
            "Logout" => {
                let auth = authenticate(facade, ctx, token)?;
                let req: LogoutRequest = params(raw)?;
                let outcome = facade.logout(ctx, &auth.caller, auth.token, req.refresh_token.as_deref())?;
                reply(LogoutResponse {
                    access_revoked: outcome.access_revoked,
                    refresh_revoked: outcome.refresh_revoked,
                })
            }
            "RevokeToken" => {
                let auth = authenticate(facade, ctx, token)?;
                let req: TokenRequest = params(raw)?;
                let revoked = facade.revoke_token(ctx, &auth.caller, &req.token)?;
                reply(RevokedResponse { revoked })
            }
            "RevokeUserTokens" => {
                let auth = authenticate(facade, ctx, token)?;
                let req: UserRef = params(raw)?;
                reply(facade.revoke_user_tokens(ctx, &auth.caller, req.tenant_id, req.user_id)?)
            }
            "RevokeAllTenantTokens" => {
                let auth = authenticate(facade, ctx, token)?;
                let req: TenantRef = params(raw)?;
                reply(facade.revoke_all_tenant_tokens(ctx, &auth.caller, req.tenant_id)?)
            }
            "DeleteAccessToken" => {
                let auth = authenticate(facade, ctx, token)?;
                let req: UserRef = params(raw)?;
                let deleted = facade.delete_access_token(ctx, &auth.caller, req.tenant_id, req.user_id)?;
                reply(DeletedResponse { deleted })
            }
            "DeleteRefreshToken" => {
                let auth = authenticate(facade, ctx, token)?;
                let req: RefreshRequest = params(raw)?;
                let deleted =
                    facade.delete_refresh_token(ctx, &auth.caller, req.tenant_id, req.user_id, &req.refresh_token)?;
                reply(DeletedResponse { deleted })
            }
            other => Err(unknown_method("auth", other)),
        }
    }
}

pub struct RbacService {
    facade: Arc<AuthorizationFacade>,
}

impl RbacService {
    pub fn handle(
        &self,
        ctx: &RequestContext,
        method: &str,
        token: Option<&str>,
        raw: JsonValue,
    ) -> AppResult<JsonValue> {
        let facade = &*self.facade;
        let auth = authenticate(facade, ctx, token)?;
        let caller = &auth.caller;
        match method {
            "CheckPermissions" => {
                let req: CheckPermissionsRequest = params(raw)?;
                let results = facade.check_permissions(ctx, caller, req.tenant_id, req.user_id, &req.permissions)?;
                reply(CheckPermissionsResponse { results })
            }
            "HasPermission" => {
                let req: HasPermissionRequest = params(raw)?;
                let allowed = facade.has_permission(
                    ctx,
                    caller,
                    req.tenant_id,
                    req.user_id,
                    &req.permission,
                    req.target_tenant_id,
                )?;
                reply(HasPermissionResponse { allowed })
            }
            "GetUserPermissions" => {
                let req: UserRef = params(raw)?;
                let permissions = facade.user_permissions(ctx, caller, req.tenant_id, req.user_id)?;
                reply(PermissionsResponse { permissions })
            }
            "GetUserRoles" => {
                let req: UserRef = params(raw)?;
                reply(json!({ "roles": facade.user_roles(ctx, caller, req.tenant_id, req.user_id)? }))
            }
            "CreateResource" => {
                let req: ResourceRequest = params(raw)?;
                reply(facade.create_resource(ctx, caller, req.tenant_id, req.kind, req.data)?)
            }
            "GetResource" => {
                let req: ResourceRequest = params(raw)?;
                let id = required(req.id.as_deref(), "id")?;
                reply(facade.get_resource(ctx, caller, req.tenant_id, req.kind, id)?)
            }
            "ListResources" => {
                let req: ResourceRequest = params(raw)?;
                reply(json!({ "items": facade.list_resources(ctx, caller, req.tenant_id, req.kind)? }))
            }
            "UpdateResource" => {
                let req: ResourceRequest = params(raw)?;
                let id = required(req.id.as_deref(), "id")?;
                reply(facade.update_resource(ctx, caller, req.tenant_id, req.kind, id, req.data)?)
            }
            "DeleteResource" => {
                let req: ResourceRequest = params(raw)?;
                let id = required(req.id.as_deref(), "id")?;
                let deleted = facade.delete_resource(ctx, caller, req.tenant_id, req.kind, id)?;
                reply(DeletedResponse { deleted })
            }
            "VerifyUserResource" => {
                let req: VerifyUserResourceRequest = params(raw)?;
                let results =
                    facade.verify_user_resource(ctx, caller, req.tenant_id, req.user_id, req.kind, &req.ids)?;
                reply(CheckPermissionsResponse { results })
            }
            other => Err(unknown_method("rbac", other)),
        }
    }
}

pub struct UserService {
    facade: Arc<AuthorizationFacade>,
}

impl UserService {
    pub fn handle(
        &self,
        ctx: &RequestContext,
        method: &str,
        token: Option<&str>,
        raw: JsonValue,
    ) -> AppResult<JsonValue> {
        let facade = &*self.facade;
        let auth = authenticate(facade, ctx, token)?;
        let caller = &auth.caller;
        match method {
            "CreateUser" => {
                let req: CreateUserRequest = params(raw)?;
                let user = facade.create_user(ctx, caller, req.tenant_id, req.user)?;
                reply(UserView::from(&user))
            }
            "GetUser" => {
                let req: UserRef = params(raw)?;
                reply(UserView::from(&facade.get_user(ctx, caller, req.tenant_id, req.user_id)?))
            }
            "ListUsers" => {
                let req: ListUsersRequest = params(raw)?;
                let users = facade.list_users(ctx, caller, req.tenant_id, req.status)?;
                reply(json!({ "users": users.iter().map(UserView::from).collect::<Vec<_>>() }))
            }
            "UpdateUserStatus" => {
                let req: UpdateUserStatusRequest = params(raw)?;
                let user = facade.update_user_status(ctx, caller, req.tenant_id, req.user_id, req.status)?;
                reply(UserView::from(&user))
            }
            "DeleteUser" => {
                let req: UserRef = params(raw)?;
                let deleted = facade.delete_user(ctx, caller, req.tenant_id, req.user_id)?;
                reply(DeletedResponse { deleted })
            }
            "AssignRole" => {
                let req: RoleAssignmentRequest = params(raw)?;
                let user =
                    facade.assign_role(ctx, caller, req.tenant_id, req.user_id, req.role_id, req.expires_at)?;
                reply(UserView::from(&user))
            }
            "UnassignRole" => {
                let req: RoleAssignmentRequest = params(raw)?;
                let removed = facade.unassign_role(ctx, caller, req.tenant_id, req.user_id, req.role_id)?;
                reply(json!({ "removed": removed }))
            }
            "GrantPermission" => {
                let req: UserPermissionRequest = params(raw)?;
                let user = facade.grant_permission(ctx, caller, req.tenant_id, req.user_id, &req.permission)?;
                reply(UserView::from(&user))
            }
            "WithdrawPermission" => {
                let req: UserPermissionRequest = params(raw)?;
                let removed = facade.withdraw_permission(ctx, caller, req.tenant_id, req.user_id, &req.permission)?;
                reply(json!({ "removed": removed }))
            }
            "DenyPermission" => {
                let req: UserPermissionRequest = params(raw)?;
                let user = facade.deny_permission(ctx, caller, req.tenant_id, req.user_id, &req.permission)?;
                reply(UserView::from(&user))
            }
            "LiftDenial" => {
                let req: UserPermissionRequest = params(raw)?;
                let removed = facade.lift_denial(ctx, caller, req.tenant_id, req.user_id, &req.permission)?;
                reply(json!({ "removed": removed }))
            }
            other => Err(unknown_method("user", other)),
        }
    }
}

pub struct TenantService {
    facade: Arc<AuthorizationFacade>,
}

impl TenantService {
    pub fn handle(
        &self,
        ctx: &RequestContext,
        method: &str,
        token: Option<&str>,
        raw: JsonValue,
    ) -> AppResult<JsonValue> {
        let facade = &*self.facade;
        let auth = authenticate(facade, ctx, token)?;
        let caller = &auth.caller;
        match method {
            "CreateTenant" => {
                let req: NewTenant = params(raw)?;
                reply(facade.create_tenant(ctx, caller, req)?)
            }
            "GetTenant" => {
                let req: TenantRef = params(raw)?;
                reply(facade.get_tenant(ctx, caller, req.tenant_id)?)
            }
            "ListTenants" => {
                let req: ListTenantsRequest = params(raw)?;
                reply(json!({ "tenants": facade.list_tenants(ctx, caller, req.status)? }))
            }
            "UpdateTenant" => {
                let req: UpdateTenantRequest = params(raw)?;
                reply(facade.update_tenant(ctx, caller, req.tenant_id, req.update)?)
            }
            "DeleteTenant" => {
                let req: TenantRef = params(raw)?;
                reply(facade.delete_tenant(ctx, caller, req.tenant_id)?)
            }
            other => Err(unknown_method("tenant", other)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────────────────────────────────────

/// Routes requests to the service they name.
pub struct RpcDispatcher {
    auth: AuthService,
    rbac: RbacService,
    users: UserService,
    tenants: TenantService,
}

impl RpcDispatcher {
    pub fn new(facade: Arc<AuthorizationFacade>) -> Self {
        Self {
            auth: AuthService { facade: facade.clone() },
            rbac: RbacService { facade: facade.clone() },
            users: UserService { facade: facade.clone() },
            tenants: TenantService { facade },
        }
    }

    pub fn dispatch(&self, ctx: &RequestContext, request: RpcRequest) -> RpcResponse {
        let RpcRequest {
            id,
            service,
            method,
            token,
            params,
        } = request;
        debug!(service = %service, method = %method, "rpc request");
        let token = token.as_deref();
        let outcome = match service.as_str() {
            "auth" => self.auth.handle(ctx, &method, token, params),
            "rbac" => self.rbac.handle(ctx, &method, token, params),
            "user" => self.users.handle(ctx, &method, token, params),
            "tenant" => self.tenants.handle(ctx, &method, token, params),
            other => Err(unknown_method(other, &method)),
        };
        RpcResponse::from_outcome(id, outcome)
    }

    /// Decode one JSON request line and encode its response.
    pub fn handle_line(&self, ctx: &RequestContext, line: &str) -> String {
        let response = match serde_json::from_str::<RpcRequest>(line) {
            Ok(request) => self.dispatch(ctx, request),
            Err(e) => RpcResponse::from_outcome(
                JsonValue::Null,
                Err(AppError::invalid_format(format!("malformed request: {e}"))),
            ),
        };
        serde_json::to_string(&response).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to encode rpc response");
            r#"{"id":null,"error":{"status":"INTERNAL","code":"INTERNAL_UNEXPECTED","category":"internal","message":"internal error"}}"#
                .to_string()
        })
    }
}
