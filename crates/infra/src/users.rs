//! User accounts: creation, administration and password authentication.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use warden_auth::{
    NewUser, PasswordHasher, PasswordPolicy, PermissionString, RoleAssignment, User, UserStatus,
};
use warden_core::{AppError, AppResult, AuthErrorKind, Clock, RequestContext, RoleId, TenantId, UserId};

use crate::credential_store::StoreError;
use crate::document_store::{Repositories, RoleStore, UserStore, unique};

/// Read-modify-write attempts before a concurrent update is reported as a conflict.
const WRITE_ATTEMPTS: usize = 8;

/// Grants and denials must name a real resource and action.
fn grant_string(raw: &str) -> AppResult<PermissionString> {
    let parsed = PermissionString::parse(raw)?;
    PermissionString::build(parsed.resource(), parsed.action())
}

pub struct UserDirectory {
    users: UserStore,
    roles: RoleStore,
    hasher: Arc<dyn PasswordHasher>,
    policy: PasswordPolicy,
    clock: Arc<dyn Clock>,
    /// Verified against when the login names no account, so both paths pay for a hash.
    decoy_hash: OnceLock<Option<String>>,
}

impl core::fmt::Debug for UserDirectory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserDirectory")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl UserDirectory {
    pub fn new(
        repos: &Repositories,
        hasher: Arc<dyn PasswordHasher>,
        policy: PasswordPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users: repos.users.clone(),
            roles: repos.roles.clone(),
            hasher,
            policy,
            clock,
            decoy_hash: OnceLock::new(),
        }
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    /// Validate, check password strength and role references, hash, insert.
    ///
    /// A taken email or username is a `Conflict`.
    pub fn create_user(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        new_user: NewUser,
        created_by: Option<UserId>,
    ) -> AppResult<User> {
        new_user.validate()?;
        self.policy.check(&new_user.password)?;
        for role_id in &new_user.roles {
            self.roles.get(ctx, tenant_id, *role_id)?;
        }

        let hash = self.hasher.hash(&new_user.password)?;
        let user = new_user.into_user(tenant_id, hash, created_by, self.clock.now())?;
        let user = self.users.insert(ctx, user)?;
        info!(target: "audit", tenant_id = %tenant_id, user_id = %user.id, "user created");
        Ok(user)
    }

    pub fn get_user(&self, ctx: &RequestContext, tenant_id: TenantId, user_id: UserId) -> AppResult<User> {
        Ok(self.users.get(ctx, tenant_id, user_id)?)
    }

    /// Look a user up by email first, then by username.
    pub fn find_by_login(&self, ctx: &RequestContext, tenant_id: TenantId, login: &str) -> AppResult<Option<User>> {
        if let Some(user) = self.users.find_unique(ctx, &unique::user_email(tenant_id, login))? {
            return Ok(Some(user));
        }
        Ok(self.users.find_unique(ctx, &unique::user_username(tenant_id, login))?)
    }

    pub fn list_users(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        status: Option<UserStatus>,
    ) -> AppResult<Vec<User>> {
        let mut users = self.users.list(ctx, tenant_id)?;
        if let Some(status) = status {
            users.retain(|u| u.status == status);
        }
        Ok(users)
    }

    /// Apply `change` to the freshest copy of the user, re-reading and
    /// re-applying whenever another writer got in between.
    fn write<T>(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
        mut change: impl FnMut(&mut User) -> T,
    ) -> AppResult<(User, T)> {
        let mut attempt = 1;
        loop {
            let mut user = self.users.get(ctx, tenant_id, user_id)?;
            let outcome = change(&mut user);
            match self.users.replace(ctx, user) {
                Ok(saved) => return Ok((saved, outcome)),
                Err(StoreError::Stale(_)) if attempt < WRITE_ATTEMPTS => {
                    debug!(tenant_id = %tenant_id, user_id = %user_id, attempt, "user changed concurrently, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn modify<T>(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
        mut change: impl FnMut(&mut User) -> T,
    ) -> AppResult<(User, T)> {
        let now = self.clock.now();
        self.write(ctx, tenant_id, user_id, |user| {
            let outcome = change(user);
            user.updated_at = now;
            outcome
        })
    }

    pub fn update_status(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
        status: UserStatus,
    ) -> AppResult<User> {
        let (user, _) = self.modify(ctx, tenant_id, user_id, |u| u.status = status)?;
        info!(target: "audit", tenant_id = %tenant_id, user_id = %user_id, ?status, "user status changed");
        Ok(user)
    }

    pub fn delete_user(&self, ctx: &RequestContext, tenant_id: TenantId, user_id: UserId) -> AppResult<bool> {
        let deleted = self.users.delete(ctx, tenant_id, user_id)?;
        if deleted {
            info!(target: "audit", tenant_id = %tenant_id, user_id = %user_id, "user deleted");
        }
        Ok(deleted)
    }

    /// Assign a role of the user's tenant, replacing any earlier assignment of it.
    pub fn assign_role(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
        assigned_by: Option<UserId>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<User> {
        self.roles.get(ctx, tenant_id, role_id)?;
        let now = self.clock.now();
        let mut assignment = RoleAssignment::new(role_id, tenant_id, assigned_by, now);
        if let Some(expires_at) = expires_at {
            if expires_at <= now {
                return Err(AppError::invalid_format("role assignment expiry must be in the future"));
            }
            assignment = assignment.expiring_at(expires_at);
        }
        let (user, _) = self.modify(ctx, tenant_id, user_id, |u| u.assign_role(assignment.clone()))?;
        info!(target: "audit", tenant_id = %tenant_id, user_id = %user_id, role_id = %role_id, "role assigned");
        Ok(user)
    }

    pub fn unassign_role(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<bool> {
        let (_, removed) = self.modify(ctx, tenant_id, user_id, |u| u.unassign_role(role_id))?;
        if removed {
            info!(target: "audit", tenant_id = %tenant_id, user_id = %user_id, role_id = %role_id, "role unassigned");
        }
        Ok(removed)
    }

    pub fn grant_permission(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
        permission: &str,
    ) -> AppResult<User> {
        let permission = grant_string(permission)?;
        let (user, _) = self.modify(ctx, tenant_id, user_id, |u| u.grant_permission(permission.clone()))?;
        info!(target: "audit", tenant_id = %tenant_id, user_id = %user_id, permission = %permission, "permission granted");
        Ok(user)
    }

    pub fn withdraw_permission(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
        permission: &str,
    ) -> AppResult<bool> {
        let permission = PermissionString::parse(permission)?;
        Ok(self.modify(ctx, tenant_id, user_id, |u| u.withdraw_permission(&permission))?.1)
    }

    /// Add an explicit denial. It overrides every grant of the same string.
    pub fn deny_permission(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
        permission: &str,
    ) -> AppResult<User> {
        let permission = grant_string(permission)?;
        let (user, _) = self.modify(ctx, tenant_id, user_id, |u| u.deny_permission(permission.clone()))?;
        info!(target: "audit", tenant_id = %tenant_id, user_id = %user_id, permission = %permission, "permission denied explicitly");
        Ok(user)
    }

    pub fn lift_denial(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
        permission: &str,
    ) -> AppResult<bool> {
        let permission = PermissionString::parse(permission)?;
        Ok(self.modify(ctx, tenant_id, user_id, |u| u.lift_denial(&permission))?.1)
    }

    /// Verify a password login.
    ///
    /// Unknown accounts and wrong passwords fail the same way. The account
    /// status is only revealed to a caller who knew the password.
    pub fn authenticate(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        login: &str,
        password: &str,
    ) -> AppResult<User> {
        let Some(mut user) = self.find_by_login(ctx, tenant_id, login)? else {
            self.burn_decoy(password);
            info!(target: "audit", tenant_id = %tenant_id, "login failed");
            return Err(AppError::auth(AuthErrorKind::InvalidCredentials));
        };

        let verified = self.hasher.verify(password, &user.password_hash)?;
        self.record_login(ctx, &mut user, verified);
        if !verified {
            info!(target: "audit", tenant_id = %tenant_id, user_id = %user.id, "login failed");
            return Err(AppError::auth(AuthErrorKind::InvalidCredentials));
        }
        if !user.is_active() {
            info!(target: "audit", tenant_id = %tenant_id, user_id = %user.id, status = ?user.status, "login refused for inactive account");
            return Err(AppError::auth(AuthErrorKind::AccountDisabled));
        }
        info!(target: "audit", tenant_id = %tenant_id, user_id = %user.id, "login succeeded");
        Ok(user)
    }

    fn burn_decoy(&self, password: &str) {
        let decoy = self.decoy_hash.get_or_init(|| match self.hasher.hash("warden-decoy-password") {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!(error = %e, "failed to prepare decoy password hash");
                None
            }
        });
        if let Some(hash) = decoy {
            let _ = self.hasher.verify(password, hash);
        }
    }

    /// Best effort: a failure is logged and the copy read at login is kept.
    fn record_login(&self, ctx: &RequestContext, user: &mut User, success: bool) {
        let now = self.clock.now();
        match self.write(ctx, user.tenant_id, user.id, |u| u.record_login(now, success)) {
            Ok((saved, _)) => *user = saved,
            Err(e) => warn!(tenant_id = %user.tenant_id, user_id = %user.id, error = %e, "failed to record login"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use warden_auth::{Argon2Hasher, NewRole};
    use warden_core::{ManualClock, ValidationKind};

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::document_store::{Document, DocumentStore, InMemoryDocumentStore};

    const PASSWORD: &str = "Correct-Horse-42!";

    fn directory() -> (Repositories, Arc<ManualClock>, UserDirectory) {
        let repos = Repositories::in_memory();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let hasher = Argon2Hasher::with_cost(1024, 1).unwrap();
        let users = UserDirectory::new(&repos, Arc::new(hasher), PasswordPolicy::default(), clock.clone());
        (repos, clock, users)
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            password: PASSWORD.into(),
            ..NewUser::default()
        }
    }

    #[test]
    fn create_then_authenticate_by_email_or_username() {
        let (_, _, users) = directory();
        let ctx = RequestContext::background();
        let t = TenantId::new();
        let created = users
            .create_user(
                &ctx,
                t,
                NewUser {
                    username: Some("alice".into()),
                    ..new_user("Alice@Acme.test")
                },
                None,
            )
            .unwrap();
        assert_eq!(created.email, "alice@acme.test");

        let by_email = users.authenticate(&ctx, t, "alice@acme.test", PASSWORD).unwrap();
        assert_eq!(by_email.id, created.id);
        let by_name = users.authenticate(&ctx, t, "alice", PASSWORD).unwrap();
        assert_eq!(by_name.login_history.len(), 2);
        assert!(by_name.last_successful_login().is_some());
    }

    #[test]
    fn unknown_account_and_wrong_password_look_the_same() {
        let (_, _, users) = directory();
        let ctx = RequestContext::background();
        let t = TenantId::new();
        users.create_user(&ctx, t, new_user("bob@acme.test"), None).unwrap();

        let unknown = users.authenticate(&ctx, t, "nobody@acme.test", PASSWORD).unwrap_err();
        let wrong = users.authenticate(&ctx, t, "bob@acme.test", "Wrong-Horse-43!").unwrap_err();
        assert_eq!(unknown.code(), wrong.code());
        assert_eq!(wrong.auth_kind(), Some(AuthErrorKind::InvalidCredentials));

        let bob = users.find_by_login(&ctx, t, "bob@acme.test").unwrap().unwrap();
        assert_eq!(bob.login_history.len(), 1);
        assert!(!bob.login_history[0].success);
    }

    #[test]
    fn disabled_accounts_are_refused_only_with_the_right_password() {
        let (_, _, users) = directory();
        let ctx = RequestContext::background();
        let t = TenantId::new();
        let user = users.create_user(&ctx, t, new_user("carol@acme.test"), None).unwrap();
        users.update_status(&ctx, t, user.id, UserStatus::Suspended).unwrap();

        let err = users.authenticate(&ctx, t, "carol@acme.test", "nope-nope-nope").unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthErrorKind::InvalidCredentials));
        let err = users.authenticate(&ctx, t, "carol@acme.test", PASSWORD).unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthErrorKind::AccountDisabled));
    }

    #[test]
    fn weak_passwords_and_unknown_roles_are_rejected() {
        let (_, _, users) = directory();
        let ctx = RequestContext::background();
        let t = TenantId::new();
        let err = users
            .create_user(
                &ctx,
                t,
                NewUser {
                    password: "password".into(),
                    ..new_user("dave@acme.test")
                },
                None,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation {
                kind: ValidationKind::WeakPassword,
                ..
            }
        ));

        let err = users
            .create_user(
                &ctx,
                t,
                NewUser {
                    roles: vec![RoleId::new()],
                    ..new_user("dave@acme.test")
                },
                None,
            )
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn duplicate_email_in_a_tenant_conflicts() {
        let (_, _, users) = directory();
        let ctx = RequestContext::background();
        let t = TenantId::new();
        users.create_user(&ctx, t, new_user("erin@acme.test"), None).unwrap();
        let err = users.create_user(&ctx, t, new_user("erin@acme.test"), None).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        users.create_user(&ctx, TenantId::new(), new_user("erin@acme.test"), None).unwrap();
    }

    #[test]
    fn role_assignments_can_expire_and_be_removed() {
        let (repos, clock, users) = directory();
        let ctx = RequestContext::background();
        let t = TenantId::new();
        let role = NewRole {
            name: "Viewer".into(),
            ..NewRole::default()
        }
        .into_role(t, None, clock.now())
        .unwrap();
        let role = repos.roles.insert(&ctx, role).unwrap();
        let user = users.create_user(&ctx, t, new_user("frank@acme.test"), None).unwrap();

        let past = clock.now() - Duration::minutes(1);
        assert!(users.assign_role(&ctx, t, user.id, role.id, None, Some(past)).is_err());

        let user = users
            .assign_role(&ctx, t, user.id, role.id, None, Some(clock.now() + Duration::hours(1)))
            .unwrap();
        assert_eq!(user.live_role_ids(clock.now()), vec![role.id]);
        clock.advance(Duration::hours(2));
        assert!(users.get_user(&ctx, t, user.id).unwrap().live_role_ids(clock.now()).is_empty());

        assert!(users.unassign_role(&ctx, t, user.id, role.id).unwrap());
        assert!(!users.unassign_role(&ctx, t, user.id, role.id).unwrap());
    }

    #[test]
    fn grants_must_name_known_resources() {
        let (_, _, users) = directory();
        let ctx = RequestContext::background();
        let t = TenantId::new();
        let user = users.create_user(&ctx, t, new_user("gina@acme.test"), None).unwrap();

        let user = users.grant_permission(&ctx, t, user.id, "order:read").unwrap();
        assert_eq!(user.additional_permissions.len(), 1);
        let err = users.grant_permission(&ctx, t, user.id, "spaceship:fly").unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation {
                kind: ValidationKind::InvalidType,
                ..
            }
        ));

        users.deny_permission(&ctx, t, user.id, "order:read").unwrap();
        assert!(users.lift_denial(&ctx, t, user.id, "order:read").unwrap());
        assert!(users.withdraw_permission(&ctx, t, user.id, "order:read").unwrap());
    }

    #[test]
    fn list_filters_by_status() {
        let (_, _, users) = directory();
        let ctx = RequestContext::background();
        let t = TenantId::new();
        let a = users.create_user(&ctx, t, new_user("a@acme.test"), None).unwrap();
        users.create_user(&ctx, t, new_user("b@acme.test"), None).unwrap();
        users.update_status(&ctx, t, a.id, UserStatus::Inactive).unwrap();

        assert_eq!(users.list_users(&ctx, t, None).unwrap().len(), 2);
        let inactive = users.list_users(&ctx, t, Some(UserStatus::Inactive)).unwrap();
        assert_eq!(inactive.len(), 1);
        assert_eq!(inactive[0].id, a.id);
    }

    struct CountingHasher {
        inner: Argon2Hasher,
        verifications: AtomicUsize,
    }

    impl PasswordHasher for CountingHasher {
        fn hash(&self, password: &str) -> AppResult<String> {
            self.inner.hash(password)
        }

        fn verify(&self, password: &str, hash: &str) -> AppResult<bool> {
            self.verifications.fetch_add(1, Ordering::SeqCst);
            self.inner.verify(password, hash)
        }
    }

    #[test]
    fn unknown_accounts_still_pay_for_a_password_check() {
        let repos = Repositories::in_memory();
        let hasher = Arc::new(CountingHasher {
            inner: Argon2Hasher::with_cost(1024, 1).unwrap(),
            verifications: AtomicUsize::new(0),
        });
        let users = UserDirectory::new(
            &repos,
            hasher.clone(),
            PasswordPolicy::default(),
            Arc::new(ManualClock::new(Utc::now())),
        );
        let ctx = RequestContext::background();
        let t = TenantId::new();
        users.create_user(&ctx, t, new_user("hank@acme.test"), None).unwrap();

        users.authenticate(&ctx, t, "nobody@acme.test", PASSWORD).unwrap_err();
        assert_eq!(hasher.verifications.load(Ordering::SeqCst), 1);
        users.authenticate(&ctx, t, "hank@acme.test", "Wrong-Horse-43!").unwrap_err();
        assert_eq!(hasher.verifications.load(Ordering::SeqCst), 2);
    }

    type Hook = Box<dyn FnOnce(&InMemoryDocumentStore<User>) + Send>;

    /// User collection that lets another writer in right before the next replace.
    struct InterleavedUsers {
        inner: InMemoryDocumentStore<User>,
        before_replace: Mutex<Option<Hook>>,
    }

    impl DocumentStore<User> for InterleavedUsers {
        fn insert(&self, ctx: &RequestContext, doc: User) -> Result<User, StoreError> {
            self.inner.insert(ctx, doc)
        }

        fn get(&self, ctx: &RequestContext, tenant_id: TenantId, id: <User as Document>::Id) -> Result<User, StoreError> {
            self.inner.get(ctx, tenant_id, id)
        }

        fn replace(&self, ctx: &RequestContext, doc: User) -> Result<User, StoreError> {
            let hook = self.before_replace.lock().unwrap().take();
            if let Some(hook) = hook {
                hook(&self.inner);
            }
            self.inner.replace(ctx, doc)
        }

        fn delete(&self, ctx: &RequestContext, tenant_id: TenantId, id: UserId) -> Result<bool, StoreError> {
            self.inner.delete(ctx, tenant_id, id)
        }

        fn list(&self, ctx: &RequestContext, tenant_id: TenantId) -> Result<Vec<User>, StoreError> {
            self.inner.list(ctx, tenant_id)
        }

        fn list_all(&self, ctx: &RequestContext) -> Result<Vec<User>, StoreError> {
            self.inner.list_all(ctx)
        }

        fn find_unique(&self, ctx: &RequestContext, key: &str) -> Result<Option<User>, StoreError> {
            self.inner.find_unique(ctx, key)
        }

        fn delete_by_tenant(&self, ctx: &RequestContext, tenant_id: TenantId) -> Result<usize, StoreError> {
            self.inner.delete_by_tenant(ctx, tenant_id)
        }
    }

    #[test]
    fn a_denial_written_during_login_survives_the_login() {
        let store = Arc::new(InterleavedUsers {
            inner: InMemoryDocumentStore::new(),
            before_replace: Mutex::new(None),
        });
        let repos = Repositories {
            users: store.clone(),
            ..Repositories::in_memory()
        };
        let users = UserDirectory::new(
            &repos,
            Arc::new(Argon2Hasher::with_cost(1024, 1).unwrap()),
            PasswordPolicy::default(),
            Arc::new(ManualClock::new(Utc::now())),
        );
        let ctx = RequestContext::background();
        let t = TenantId::new();
        let user_id = users.create_user(&ctx, t, new_user("ivy@acme.test"), None).unwrap().id;
        let order_read = PermissionString::parse("order:read").unwrap();

        let denial = order_read.clone();
        *store.before_replace.lock().unwrap() = Some(Box::new(move |inner: &InMemoryDocumentStore<User>| {
            let ctx = RequestContext::background();
            let mut current = inner.get(&ctx, t, user_id).unwrap();
            current.deny_permission(denial);
            inner.replace(&ctx, current).unwrap();
        }));

        let logged_in = users.authenticate(&ctx, t, "ivy@acme.test", PASSWORD).unwrap();
        assert_eq!(logged_in.revoked_permissions, vec![order_read.clone()]);

        let stored = users.get_user(&ctx, t, user_id).unwrap();
        assert_eq!(stored.revoked_permissions, vec![order_read]);
        assert_eq!(stored.login_history.len(), 1);
        assert_eq!(stored.version, 2);
    }
}
