use std::collections::BTreeSet;

use serde::Serialize;

use warden_core::{AppError, AppResult, AuthErrorKind, SystemIdentity, TenantId};

use crate::permissions::{Permission, PermissionString};
use crate::user::User;

/// A user's resolved permission set.
///
/// Built from role grants plus additional grants; explicit denials are kept
/// alongside so an exact-string denial beats every grant, `*:*` included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectivePermissions {
    granted: BTreeSet<PermissionString>,
    denied: BTreeSet<PermissionString>,
}

impl EffectivePermissions {
    /// Combine already-resolved role grants with the user's own overrides.
    pub fn resolve<I>(role_grants: I, user: &User) -> Self
    where
        I: IntoIterator<Item = PermissionString>,
    {
        let mut granted: BTreeSet<PermissionString> = role_grants.into_iter().collect();
        granted.extend(user.additional_permissions.iter().cloned());
        let denied = user.revoked_permissions.iter().cloned().collect();
        Self { granted, denied }
    }

    pub fn from_parts(
        granted: impl IntoIterator<Item = PermissionString>,
        denied: impl IntoIterator<Item = PermissionString>,
    ) -> Self {
        Self {
            granted: granted.into_iter().collect(),
            denied: denied.into_iter().collect(),
        }
    }

    /// Grants minus denials, sorted.
    pub fn effective(&self) -> Vec<PermissionString> {
        self.granted
            .iter()
            .filter(|p| !self.denied.contains(*p))
            .cloned()
            .collect()
    }

    pub fn is_denied(&self, required: &PermissionString) -> bool {
        self.denied.contains(required)
    }

    pub fn has_wildcard(&self) -> bool {
        self.granted.contains(&PermissionString::wildcard())
    }

    /// Same-tenant check: exact string or `*:*`.
    pub fn allows(&self, required: &PermissionString) -> bool {
        !self.is_denied(required) && (self.granted.contains(required) || self.has_wildcard())
    }

    /// Cross-tenant check: some grant covers `required`, honouring partial wildcards.
    pub fn allows_cross_tenant(&self, required: &PermissionString) -> bool {
        !self.is_denied(required) && self.granted.iter().any(|g| g.covers(required))
    }

    pub fn decide(
        &self,
        required: &PermissionString,
        caller_tenant: TenantId,
        target_tenant: TenantId,
        system: &SystemIdentity,
    ) -> Decision {
        if self.is_denied(required) {
            return Decision::Denied(DenialKind::ExplicitlyRevoked);
        }
        if caller_tenant == target_tenant {
            if self.granted.contains(required) {
                return Decision::Granted(GrantKind::Exact);
            }
            if self.has_wildcard() {
                return Decision::Granted(GrantKind::Wildcard);
            }
            return Decision::Denied(DenialKind::MissingPermission);
        }
        // Reaching into another tenant is only ever possible from the system tenant.
        if !system.is_system_tenant(caller_tenant) {
            return Decision::Denied(DenialKind::TenantMismatch);
        }
        if self.allows_cross_tenant(required) {
            Decision::Granted(GrantKind::CrossTenant)
        } else {
            Decision::Denied(DenialKind::MissingPermission)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
    Exact,
    Wildcard,
    CrossTenant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    ExplicitlyRevoked,
    MissingPermission,
    TenantMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "reason")]
pub enum Decision {
    Granted(GrantKind),
    Denied(DenialKind),
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted(_))
    }

    /// Collapse into the error surfaced to callers. The reason stays in logs only.
    pub fn into_result(self) -> AppResult<GrantKind> {
        match self {
            Decision::Granted(kind) => Ok(kind),
            Decision::Denied(DenialKind::TenantMismatch) => {
                Err(AppError::auth(AuthErrorKind::TenantAccessDenied))
            }
            Decision::Denied(_) => Err(AppError::permission_denied()),
        }
    }
}

/// Grant strings carried by the permissions a role references, skipping inactive ones.
pub fn live_role_grants<'a, I>(permissions: I) -> Vec<PermissionString>
where
    I: IntoIterator<Item = &'a Permission>,
{
    permissions
        .into_iter()
        .filter(|p| p.is_active())
        .map(|p| p.permission_string.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use warden_core::{PermissionId, RoleId, UserId};

    use crate::permissions::{Action, ResourceType};

    fn p(s: &str) -> PermissionString {
        PermissionString::parse(s).unwrap()
    }

    fn system() -> SystemIdentity {
        SystemIdentity::new(TenantId::new(), RoleId::new(), PermissionId::new(), UserId::new())
    }

    #[test]
    fn wildcard_allows_everything_in_same_tenant() {
        let perms = EffectivePermissions::from_parts([p("*:*")], []);
        assert!(perms.allows(&p("order:read")));
        assert!(perms.allows(&p("tenant:delete")));
    }

    #[test]
    fn partial_wildcard_does_not_count_within_a_tenant() {
        let perms = EffectivePermissions::from_parts([p("order:*")], []);
        assert!(!perms.allows(&p("order:read")));
        assert!(perms.allows(&p("order:*")));
    }

    #[test]
    fn exact_denial_beats_wildcard() {
        let perms = EffectivePermissions::from_parts([p("*:*")], [p("order:read")]);
        assert!(!perms.allows(&p("order:read")));
        assert!(perms.allows(&p("order:update")));
        assert!(!perms.effective().contains(&p("order:read")));
    }

    #[test]
    fn resource_level_denial_does_not_defeat_wildcard() {
        let perms = EffectivePermissions::from_parts([p("*:*")], [p("order:*")]);
        assert!(perms.allows(&p("order:read")));
    }

    #[test]
    fn cross_tenant_requires_system_caller() {
        let system = system();
        let perms = EffectivePermissions::from_parts([p("*:*")], []);
        let other = TenantId::new();
        let decision = perms.decide(&p("order:read"), TenantId::new(), other, &system);
        assert_eq!(decision, Decision::Denied(DenialKind::TenantMismatch));
        assert_eq!(
            decision.into_result().unwrap_err().auth_kind(),
            Some(AuthErrorKind::TenantAccessDenied)
        );

        let decision = perms.decide(&p("order:read"), system.tenant_id(), other, &system);
        assert_eq!(decision, Decision::Granted(GrantKind::CrossTenant));
    }

    #[test]
    fn system_caller_cross_tenant_honours_partial_wildcards() {
        let system = system();
        let perms = EffectivePermissions::from_parts([p("token:*"), p("*:read")], []);
        let target = TenantId::new();
        assert!(perms.decide(&p("token:delete"), system.tenant_id(), target, &system).is_granted());
        assert!(perms.decide(&p("user:read"), system.tenant_id(), target, &system).is_granted());
        assert!(!perms.decide(&p("user:delete"), system.tenant_id(), target, &system).is_granted());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// An exact-string denial always wins, whatever else is granted.
        #[test]
        fn denial_overrides_any_grant(
            r in 0usize..ResourceType::ALL.len(),
            a in 0usize..Action::ALL.len(),
            with_wildcard in any::<bool>(),
        ) {
            let required = PermissionString::of(ResourceType::ALL[r], Action::ALL[a]);
            let mut grants = vec![required.clone()];
            if with_wildcard {
                grants.push(PermissionString::wildcard());
            }
            let perms = EffectivePermissions::from_parts(grants, [required.clone()]);
            prop_assert!(!perms.allows(&required));
            prop_assert!(!perms.allows_cross_tenant(&required));
        }
    }
}
