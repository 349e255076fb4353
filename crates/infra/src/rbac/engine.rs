use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use warden_auth::{
    EffectivePermissions, GrantKind, Permission, PermissionString, Role, User, live_role_grants,
};
use warden_core::{AppError, AppResult, Clock, RequestContext, RoleId, SystemIdentity, TenantId, UserId};

use super::resource::{ResourceId, ResourceKind, ResourcePayload, ResourceRecord, ResourceUpdate};
use crate::credential_store::StoreError;
use crate::document_store::{PermissionStore, Repositories, RoleStore, UserStore, get_optional};

/// Resolves effective permission sets and answers authorization queries.
///
/// Also owns the write path for roles and permissions. It never checks who is
/// asking for a write; that is the facade's job.
pub struct PermissionResolutionEngine {
    users: UserStore,
    roles: RoleStore,
    permissions: PermissionStore,
    clock: Arc<dyn Clock>,
    system: SystemIdentity,
}

impl core::fmt::Debug for PermissionResolutionEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PermissionResolutionEngine")
            .field("system", &self.system)
            .finish_non_exhaustive()
    }
}

impl PermissionResolutionEngine {
    pub fn new(repos: &Repositories, clock: Arc<dyn Clock>, system: SystemIdentity) -> Self {
        Self {
            users: repos.users.clone(),
            roles: repos.roles.clone(),
            permissions: repos.permissions.clone(),
            clock,
            system,
        }
    }

    pub fn system(&self) -> &SystemIdentity {
        &self.system
    }

    pub fn effective_permissions(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> AppResult<EffectivePermissions> {
        let user = self.users.get(ctx, tenant_id, user_id)?;
        self.resolve_for(ctx, &user)
    }

    /// Role grants of every live assignment, plus the user's own grants and denials.
    ///
    /// Expired assignments, inactive roles and inactive permissions contribute
    /// nothing. A role that disappeared is skipped with a warning.
    pub fn resolve_for(&self, ctx: &RequestContext, user: &User) -> AppResult<EffectivePermissions> {
        let now = self.clock.now();
        let mut grants = Vec::new();

        for assignment in user.roles.iter().filter(|a| a.is_live(now)) {
            let role = match get_optional::<Role, _>(&*self.roles, ctx, assignment.tenant_id, assignment.role_id)? {
                Some(role) if role.is_active() => role,
                Some(_) => continue,
                None => {
                    warn!(
                        tenant_id = %user.tenant_id,
                        user_id = %user.id,
                        role_id = %assignment.role_id,
                        "assigned role no longer exists"
                    );
                    continue;
                }
            };

            let mut permissions = Vec::with_capacity(role.permissions.len());
            for permission_id in &role.permissions {
                if let Some(permission) =
                    get_optional::<Permission, _>(&*self.permissions, ctx, role.tenant_id, *permission_id)?
                {
                    permissions.push(permission);
                }
            }
            grants.extend(live_role_grants(&permissions));
        }

        Ok(EffectivePermissions::resolve(grants, user))
    }

    /// Succeeds when the caller holds `permission` for `target_tenant`.
    ///
    /// The string is only checked for shape here; an unknown but well-formed
    /// permission simply is not granted. Unknown callers are denied, not reported missing.
    pub fn has_permission(
        &self,
        ctx: &RequestContext,
        caller_tenant: TenantId,
        caller_user: UserId,
        permission: &str,
        target_tenant: TenantId,
    ) -> AppResult<GrantKind> {
        let required = PermissionString::parse(permission)?;
        self.authorize(ctx, caller_tenant, caller_user, &required, target_tenant)
    }

    pub fn authorize(
        &self,
        ctx: &RequestContext,
        caller_tenant: TenantId,
        caller_user: UserId,
        required: &PermissionString,
        target_tenant: TenantId,
    ) -> AppResult<GrantKind> {
        let user = match self.users.get(ctx, caller_tenant, caller_user) {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => {
                debug!(tenant_id = %caller_tenant, user_id = %caller_user, "authorization for unknown caller");
                return Err(AppError::permission_denied());
            }
            Err(e) => return Err(e.into()),
        };
        if !user.is_active() {
            return Err(AppError::permission_denied());
        }

        let decision = self
            .resolve_for(ctx, &user)?
            .decide(required, caller_tenant, target_tenant, &self.system);
        if decision.is_granted() {
            debug!(
                tenant_id = %caller_tenant,
                user_id = %caller_user,
                permission = %required,
                target_tenant = %target_tenant,
                ?decision,
                "permission granted"
            );
        } else {
            info!(
                target: "audit",
                tenant_id = %caller_tenant,
                user_id = %caller_user,
                permission = %required,
                target_tenant = %target_tenant,
                ?decision,
                "permission denied"
            );
        }
        decision.into_result()
    }

    /// Evaluate several permissions against one resolution of the caller's set.
    ///
    /// Every string is shape-checked before anything is resolved.
    pub fn check_permissions(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
        permissions: &[String],
    ) -> AppResult<BTreeMap<String, bool>> {
        let parsed = permissions
            .iter()
            .map(|raw| PermissionString::parse(raw).map(|p| (raw.clone(), p)))
            .collect::<AppResult<Vec<_>>>()?;
        let effective = self.effective_permissions(ctx, tenant_id, user_id)?;
        Ok(parsed
            .into_iter()
            .map(|(raw, permission)| (raw, effective.allows(&permission)))
            .collect())
    }

    /// Roles behind the user's live assignments, skipping any that disappeared.
    pub fn user_roles(&self, ctx: &RequestContext, tenant_id: TenantId, user_id: UserId) -> AppResult<Vec<Role>> {
        let user = self.users.get(ctx, tenant_id, user_id)?;
        let now = self.clock.now();
        let mut roles = Vec::new();
        for assignment in user.roles.iter().filter(|a| a.is_live(now)) {
            if let Some(role) = get_optional::<Role, _>(&*self.roles, ctx, assignment.tenant_id, assignment.role_id)? {
                roles.push(role);
            }
        }
        Ok(roles)
    }

    /// Which of `role_ids` the user currently holds.
    pub fn verify_user_roles(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
        role_ids: &[RoleId],
    ) -> AppResult<BTreeMap<RoleId, bool>> {
        let user = self.users.get(ctx, tenant_id, user_id)?;
        let held = user.live_role_ids(self.clock.now());
        Ok(role_ids.iter().map(|id| (*id, held.contains(id))).collect())
    }

    fn ensure_permissions_exist(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        role: &Role,
    ) -> AppResult<()> {
        for permission_id in &role.permissions {
            if get_optional::<Permission, _>(&*self.permissions, ctx, tenant_id, *permission_id)?.is_none() {
                return Err(AppError::not_found(format!("permission {permission_id}")));
            }
        }
        Ok(())
    }

    pub fn create_resource(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        payload: ResourcePayload,
        created_by: Option<UserId>,
    ) -> AppResult<ResourceRecord> {
        let now = self.clock.now();
        let record = match payload {
            ResourcePayload::Role(new_role) => {
                let role = new_role.into_role(tenant_id, created_by, now)?;
                self.ensure_permissions_exist(ctx, tenant_id, &role)?;
                ResourceRecord::Role(self.roles.insert(ctx, role)?)
            }
            ResourcePayload::Permission(new_permission) => {
                let permission = new_permission.into_permission(tenant_id, created_by, now)?;
                ResourceRecord::Permission(self.permissions.insert(ctx, permission)?)
            }
        };
        info!(target: "audit", tenant_id = %tenant_id, resource = %record.id(), "resource created");
        Ok(record)
    }

    pub fn get_resource(&self, ctx: &RequestContext, tenant_id: TenantId, id: ResourceId) -> AppResult<ResourceRecord> {
        Ok(match id {
            ResourceId::Role(id) => ResourceRecord::Role(self.roles.get(ctx, tenant_id, id)?),
            ResourceId::Permission(id) => ResourceRecord::Permission(self.permissions.get(ctx, tenant_id, id)?),
        })
    }

    pub fn list_resources(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        kind: ResourceKind,
    ) -> AppResult<Vec<ResourceRecord>> {
        Ok(match kind {
            ResourceKind::Role => self
                .roles
                .list(ctx, tenant_id)?
                .into_iter()
                .map(ResourceRecord::Role)
                .collect(),
            ResourceKind::Permission => self
                .permissions
                .list(ctx, tenant_id)?
                .into_iter()
                .map(ResourceRecord::Permission)
                .collect(),
        })
    }

    pub fn update_resource(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        id: ResourceId,
        update: ResourceUpdate,
    ) -> AppResult<ResourceRecord> {
        let mut record = self.get_resource(ctx, tenant_id, id)?;
        record.apply_update(update, self.clock.now())?;
        let record = match record {
            ResourceRecord::Role(role) => {
                self.ensure_permissions_exist(ctx, tenant_id, &role)?;
                ResourceRecord::Role(self.roles.replace(ctx, role)?)
            }
            ResourceRecord::Permission(permission) => {
                ResourceRecord::Permission(self.permissions.replace(ctx, permission)?)
            }
        };
        info!(target: "audit", tenant_id = %tenant_id, resource = %id, "resource updated");
        Ok(record)
    }

    /// Idempotent; `false` when nothing was there. Seeded system roles stay put.
    pub fn delete_resource(&self, ctx: &RequestContext, tenant_id: TenantId, id: ResourceId) -> AppResult<bool> {
        let deleted = match id {
            ResourceId::Role(role_id) => {
                match get_optional::<Role, _>(&*self.roles, ctx, tenant_id, role_id)? {
                    Some(role) if role.is_system_role => {
                        return Err(AppError::business(format!("system role '{}' cannot be deleted", role.slug)));
                    }
                    Some(_) => self.roles.delete(ctx, tenant_id, role_id)?,
                    None => false,
                }
            }
            ResourceId::Permission(permission_id) => self.permissions.delete(ctx, tenant_id, permission_id)?,
        };
        if deleted {
            info!(target: "audit", tenant_id = %tenant_id, resource = %id, "resource deleted");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use proptest::prelude::*;
    use warden_auth::{
        Action, NewPermission, NewRole, NewUser, RecordStatus, ResourceType, RoleAssignment, RoleUpdate,
    };
    use warden_core::{AuthErrorKind, ManualClock, PermissionId, ValidationKind};

    use crate::document_store::DocumentStore;

    struct Fixture {
        repos: Repositories,
        clock: Arc<ManualClock>,
        engine: PermissionResolutionEngine,
        system_tenant: TenantId,
    }

    fn fixture() -> Fixture {
        let repos = Repositories::in_memory();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let system_tenant = TenantId::new();
        let system = SystemIdentity::new(system_tenant, RoleId::new(), PermissionId::new(), UserId::new());
        let engine = PermissionResolutionEngine::new(&repos, clock.clone(), system);
        Fixture {
            repos,
            clock,
            engine,
            system_tenant,
        }
    }

    impl Fixture {
        fn permission(&self, tenant: TenantId, resource: &str, action: &str) -> PermissionId {
            let record = self
                .engine
                .create_resource(
                    &RequestContext::background(),
                    tenant,
                    ResourcePayload::Permission(NewPermission {
                        resource: resource.into(),
                        action: action.into(),
                        ..NewPermission::default()
                    }),
                    None,
                )
                .unwrap();
            match record.id() {
                ResourceId::Permission(id) => id,
                ResourceId::Role(_) => unreachable!(),
            }
        }

        fn role(&self, tenant: TenantId, name: &str, permissions: Vec<PermissionId>) -> RoleId {
            let record = self
                .engine
                .create_resource(
                    &RequestContext::background(),
                    tenant,
                    ResourcePayload::Role(NewRole {
                        name: name.into(),
                        permissions,
                        ..NewRole::default()
                    }),
                    None,
                )
                .unwrap();
            match record.id() {
                ResourceId::Role(id) => id,
                ResourceId::Permission(_) => unreachable!(),
            }
        }

        fn user(&self, tenant: TenantId, email: &str, roles: Vec<RoleId>) -> User {
            let user = NewUser {
                email: email.into(),
                password: "x".into(),
                roles,
                ..NewUser::default()
            }
            .into_user(tenant, "hash".into(), None, self.clock.now())
            .unwrap();
            self.repos.users.insert(&RequestContext::background(), user).unwrap()
        }

        fn save(&self, user: User) {
            self.repos.users.replace(&RequestContext::background(), user).unwrap();
        }
    }

    fn auth_kind(result: AppResult<GrantKind>) -> Option<AuthErrorKind> {
        result.err().and_then(|e| e.auth_kind())
    }

    #[test]
    fn batch_check_evaluates_each_key_against_one_resolution() {
        let f = fixture();
        let ctx = RequestContext::background();
        let t1 = TenantId::new();
        let read = f.permission(t1, "order", "read");
        let role = f.role(t1, "Order Reader", vec![read]);
        let user = f.user(t1, "u1@acme.test", vec![role]);

        let result = f
            .engine
            .check_permissions(&ctx, t1, user.id, &["order:read".into(), "order:write".into()])
            .unwrap();
        assert_eq!(result.get("order:read"), Some(&true));
        assert_eq!(result.get("order:write"), Some(&false));
    }

    #[test]
    fn batch_check_rejects_malformed_strings() {
        let f = fixture();
        let ctx = RequestContext::background();
        let t1 = TenantId::new();
        let user = f.user(t1, "u1@acme.test", vec![]);
        let err = f
            .engine
            .check_permissions(&ctx, t1, user.id, &["order:read".into(), "Order:Read:x".into()])
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn explicit_denial_beats_a_role_grant() {
        let f = fixture();
        let ctx = RequestContext::background();
        let t1 = TenantId::new();
        let read = f.permission(t1, "order", "read");
        let role = f.role(t1, "Order Reader", vec![read]);
        let mut user = f.user(t1, "u1@acme.test", vec![role]);
        assert!(f.engine.has_permission(&ctx, t1, user.id, "order:read", t1).is_ok());

        user.deny_permission(PermissionString::parse("order:read").unwrap());
        f.save(user.clone());
        assert_eq!(
            auth_kind(f.engine.has_permission(&ctx, t1, user.id, "order:read", t1)),
            Some(AuthErrorKind::PermissionDenied)
        );
    }

    #[test]
    fn expired_assignments_and_inactive_records_grant_nothing() {
        let f = fixture();
        let ctx = RequestContext::background();
        let t1 = TenantId::new();
        let read = f.permission(t1, "order", "read");
        let role = f.role(t1, "Order Reader", vec![read]);
        let mut user = f.user(t1, "u1@acme.test", vec![]);
        user.assign_role(RoleAssignment::new(role, t1, None, f.clock.now()).expiring_at(f.clock.now() + Duration::hours(1)));
        f.save(user.clone());
        assert!(f.engine.has_permission(&ctx, t1, user.id, "order:read", t1).is_ok());

        f.clock.advance(Duration::hours(2));
        assert!(f.engine.has_permission(&ctx, t1, user.id, "order:read", t1).is_err());
        assert!(f.engine.user_roles(&ctx, t1, user.id).unwrap().is_empty());

        let other = f.user(t1, "u2@acme.test", vec![role]);
        assert!(f.engine.has_permission(&ctx, t1, other.id, "order:read", t1).is_ok());
        f.engine
            .update_resource(
                &ctx,
                t1,
                ResourceId::Role(role),
                ResourceUpdate::Role(RoleUpdate {
                    status: Some(RecordStatus::Inactive),
                    ..RoleUpdate::default()
                }),
            )
            .unwrap();
        assert!(f.engine.has_permission(&ctx, t1, other.id, "order:read", t1).is_err());
    }

    #[test]
    fn cross_tenant_reach_requires_the_system_tenant() {
        let f = fixture();
        let ctx = RequestContext::background();
        let (t1, t2) = (TenantId::new(), TenantId::new());
        let all = f.permission(t1, "*", "*");
        let admin_role = f.role(t1, "Admin", vec![all]);
        let tenant_admin = f.user(t1, "admin@acme.test", vec![admin_role]);
        assert_eq!(
            auth_kind(f.engine.has_permission(&ctx, t1, tenant_admin.id, "order:read", t2)),
            Some(AuthErrorKind::TenantAccessDenied)
        );

        let sys_perm = f.permission(f.system_tenant, "order", "*");
        let sys_role = f.role(f.system_tenant, "Order Operator", vec![sys_perm]);
        let operator = f.user(f.system_tenant, "ops@system.test", vec![sys_role]);
        assert_eq!(
            f.engine.has_permission(&ctx, f.system_tenant, operator.id, "order:delete", t2).unwrap(),
            GrantKind::CrossTenant
        );
        assert!(f.engine.has_permission(&ctx, f.system_tenant, operator.id, "user:read", t2).is_err());
    }

    #[test]
    fn unknown_callers_are_denied_not_reported_missing() {
        let f = fixture();
        let ctx = RequestContext::background();
        let t1 = TenantId::new();
        assert_eq!(
            auth_kind(f.engine.has_permission(&ctx, t1, UserId::new(), "order:read", t1)),
            Some(AuthErrorKind::PermissionDenied)
        );
    }

    #[test]
    fn role_creation_checks_referenced_permissions() {
        let f = fixture();
        let ctx = RequestContext::background();
        let t1 = TenantId::new();
        let err = f
            .engine
            .create_resource(
                &ctx,
                t1,
                ResourcePayload::Role(NewRole {
                    name: "Broken".into(),
                    permissions: vec![PermissionId::new()],
                    ..NewRole::default()
                }),
                None,
            )
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn permission_components_are_validated_against_closed_sets() {
        let f = fixture();
        let ctx = RequestContext::background();
        let err = f
            .engine
            .create_resource(
                &ctx,
                TenantId::new(),
                ResourcePayload::Permission(NewPermission {
                    resource: "spaceship".into(),
                    action: "read".into(),
                    ..NewPermission::default()
                }),
                None,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation {
                kind: ValidationKind::InvalidType,
                ..
            }
        ));
    }

    #[test]
    fn duplicate_permission_strings_conflict_within_a_tenant() {
        let f = fixture();
        let ctx = RequestContext::background();
        let t1 = TenantId::new();
        f.permission(t1, "order", "read");
        f.permission(TenantId::new(), "order", "read");
        let err = f
            .engine
            .create_resource(
                &ctx,
                t1,
                ResourcePayload::Permission(NewPermission {
                    resource: "order".into(),
                    action: "read".into(),
                    ..NewPermission::default()
                }),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn system_roles_cannot_be_deleted_and_deletes_are_idempotent() {
        let f = fixture();
        let ctx = RequestContext::background();
        let t1 = TenantId::new();
        let seeded = f
            .engine
            .create_resource(
                &ctx,
                t1,
                ResourcePayload::Role(NewRole {
                    name: "Tenant Administrator".into(),
                    is_system_role: true,
                    ..NewRole::default()
                }),
                None,
            )
            .unwrap();
        assert!(matches!(
            f.engine.delete_resource(&ctx, t1, seeded.id()).unwrap_err(),
            AppError::Business(_)
        ));

        let plain = f.role(t1, "Viewer", vec![]);
        assert!(f.engine.delete_resource(&ctx, t1, ResourceId::Role(plain)).unwrap());
        assert!(!f.engine.delete_resource(&ctx, t1, ResourceId::Role(plain)).unwrap());
    }

    #[test]
    fn verify_user_roles_reports_membership() {
        let f = fixture();
        let ctx = RequestContext::background();
        let t1 = TenantId::new();
        let held = f.role(t1, "Viewer", vec![]);
        let not_held = f.role(t1, "Editor", vec![]);
        let user = f.user(t1, "u1@acme.test", vec![held]);
        let result = f.engine.verify_user_roles(&ctx, t1, user.id, &[held, not_held]).unwrap();
        assert_eq!(result.get(&held), Some(&true));
        assert_eq!(result.get(&not_held), Some(&false));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, ..ProptestConfig::default() })]

        #[test]
        fn wildcard_role_grants_every_pair_except_denials(
            resource in prop::sample::select(ResourceType::ALL.to_vec()),
            action in prop::sample::select(Action::ALL.to_vec()),
            deny in any::<bool>(),
        ) {
            let f = fixture();
            let ctx = RequestContext::background();
            let t1 = TenantId::new();
            let all = f.permission(t1, "*", "*");
            let role = f.role(t1, "Admin", vec![all]);
            let mut user = f.user(t1, "admin@acme.test", vec![role]);
            let required = PermissionString::of(resource, action);
            if deny {
                user.deny_permission(required.clone());
                f.save(user.clone());
            }
            let outcome = f.engine.has_permission(&ctx, t1, user.id, required.as_str(), t1);
            prop_assert_eq!(outcome.is_ok(), !deny);
        }
    }
}
