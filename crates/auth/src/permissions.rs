//! Permission grammar and the permission resource.
//!
//! A permission string is lowercase `resource:action` with exactly one colon.
//! Either side may be `*`. Strings are only *built* from the closed
//! [`ResourceType`]/[`Action`] enumerations; strings *received* from callers are
//! checked for shape only, so asking about an unknown pair is answered with
//! "not granted" instead of an error.

use core::str::FromStr;
use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{AppError, AppResult, PermissionId, TenantId, UserId};

pub const WILDCARD: &str = "*";

// ─────────────────────────────────────────────────────────────────────────────
// Closed enumerations
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    #[serde(rename = "*")]
    All,
    User,
    Role,
    Permission,
    Order,
    Product,
    Vendor,
    Customer,
    Config,
    Tenant,
    Token,
}

impl ResourceType {
    pub const ALL: [ResourceType; 11] = [
        ResourceType::All,
        ResourceType::User,
        ResourceType::Role,
        ResourceType::Permission,
        ResourceType::Order,
        ResourceType::Product,
        ResourceType::Vendor,
        ResourceType::Customer,
        ResourceType::Config,
        ResourceType::Tenant,
        ResourceType::Token,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::All => WILDCARD,
            ResourceType::User => "user",
            ResourceType::Role => "role",
            ResourceType::Permission => "permission",
            ResourceType::Order => "order",
            ResourceType::Product => "product",
            ResourceType::Vendor => "vendor",
            ResourceType::Customer => "customer",
            ResourceType::Config => "config",
            ResourceType::Tenant => "tenant",
            ResourceType::Token => "token",
        }
    }
}

impl FromStr for ResourceType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| AppError::invalid_type(format!("unknown resource type '{s}'")))
    }
}

impl core::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[serde(rename = "*")]
    All,
    Create,
    Read,
    Update,
    Delete,
    /// Managing the permission grants of a user.
    Permission,
    /// Managing the role assignments of a user.
    Role,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::All,
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::Permission,
        Action::Role,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::All => WILDCARD,
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Permission => "permission",
            Action::Role => "role",
        }
    }
}

impl FromStr for Action {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| AppError::invalid_type(format!("unknown action '{s}'")))
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Permission string
// ─────────────────────────────────────────────────────────────────────────────

/// Canonical `resource:action` string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionString(Cow<'static, str>);

impl PermissionString {
    /// Check the wire shape of a caller-supplied string.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let mut parts = raw.split(':');
        let (Some(resource), Some(action), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(AppError::invalid_format(format!(
                "permission '{raw}' must have the form resource:action"
            )));
        };
        if !is_component(resource) || !is_component(action) {
            return Err(AppError::invalid_format(format!(
                "permission '{raw}' must be lowercase resource:action"
            )));
        }
        Ok(Self(Cow::Owned(raw.to_string())))
    }

    /// Build from unvalidated components; both must belong to the closed sets.
    pub fn build(resource: &str, action: &str) -> AppResult<Self> {
        let resource = ResourceType::from_str(resource)?;
        let action = Action::from_str(action)?;
        Ok(Self::of(resource, action))
    }

    pub fn of(resource: ResourceType, action: Action) -> Self {
        Self(Cow::Owned(format!("{}:{}", resource.as_str(), action.as_str())))
    }

    pub fn wildcard() -> Self {
        Self(Cow::Borrowed("*:*"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn resource(&self) -> &str {
        self.split().0
    }

    pub fn action(&self) -> &str {
        self.split().1
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*:*"
    }

    /// Whether holding `self` covers `required`, honouring `*` on either side.
    pub fn covers(&self, required: &PermissionString) -> bool {
        let resource_ok = self.resource() == WILDCARD || self.resource() == required.resource();
        let action_ok = self.action() == WILDCARD || self.action() == required.action();
        resource_ok && action_ok
    }

    fn split(&self) -> (&str, &str) {
        self.0.split_once(':').unwrap_or((self.as_str(), ""))
    }
}

fn is_component(s: &str) -> bool {
    if s == WILDCARD {
        return true;
    }
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

impl TryFrom<String> for PermissionString {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PermissionString> for String {
    fn from(value: PermissionString) -> Self {
        value.0.into_owned()
    }
}

impl FromStr for PermissionString {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl core::fmt::Display for PermissionString {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Permission resource
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle status shared by roles and permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    #[default]
    Active,
    Inactive,
}

impl FromStr for RecordStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RecordStatus::Active),
            "inactive" => Ok(RecordStatus::Inactive),
            other => Err(AppError::invalid_type(format!("unknown status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub tenant_id: TenantId,
    pub resource: ResourceType,
    pub action: Action,
    pub permission_string: PermissionString,
    pub display_name: String,
    pub description: String,
    pub is_dangerous: bool,
    pub requires_approval: bool,
    pub status: RecordStatus,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }
}

/// Input for creating a permission. Components arrive as raw strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPermission {
    pub resource: String,
    pub action: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_dangerous: bool,
    #[serde(default)]
    pub requires_approval: bool,
}

impl NewPermission {
    /// The tenant-wide full-access grant.
    pub fn wildcard() -> Self {
        Self {
            resource: WILDCARD.to_string(),
            action: WILDCARD.to_string(),
            display_name: "Full Access".to_string(),
            description: "Grants full access to all resources and actions".to_string(),
            is_dangerous: true,
            requires_approval: false,
        }
    }

    pub fn into_permission(
        self,
        tenant_id: TenantId,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> AppResult<Permission> {
        let resource = ResourceType::from_str(&self.resource)?;
        let action = Action::from_str(&self.action)?;
        let permission_string = PermissionString::of(resource, action);
        let display_name = if self.display_name.trim().is_empty() {
            permission_string.to_string()
        } else {
            self.display_name
        };

        Ok(Permission {
            id: PermissionId::new(),
            tenant_id,
            resource,
            action,
            // Any wildcard grant is dangerous regardless of what the caller said.
            is_dangerous: self.is_dangerous
                || resource == ResourceType::All
                || action == Action::All,
            permission_string,
            display_name,
            description: self.description,
            requires_approval: self.requires_approval,
            status: RecordStatus::Active,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Mutable fields of a permission. Resource and action are fixed at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionUpdate {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub requires_approval: Option<bool>,
    pub status: Option<RecordStatus>,
}

impl PermissionUpdate {
    pub fn apply(self, permission: &mut Permission, now: DateTime<Utc>) {
        if let Some(display_name) = self.display_name {
            permission.display_name = display_name;
        }
        if let Some(description) = self.description {
            permission.description = description;
        }
        if let Some(requires_approval) = self.requires_approval {
            permission.requires_approval = requires_approval;
        }
        if let Some(status) = self.status {
            permission.status = status;
        }
        permission.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use warden_core::{ErrorCategory, ValidationKind};

    #[test]
    fn parse_accepts_well_formed_strings() {
        for raw in ["order:read", "*:*", "user:*", "*:delete", "order:write"] {
            assert_eq!(PermissionString::parse(raw).unwrap().as_str(), raw);
        }
    }

    #[test]
    fn parse_rejects_bad_shapes() {
        for raw in ["", "order", "order:", ":read", "a:b:c", "Order:read", "order read", "order:READ"] {
            let err = PermissionString::parse(raw).unwrap_err();
            assert_eq!(err.category(), ErrorCategory::Validation, "{raw}");
        }
    }

    #[test]
    fn build_rejects_components_outside_closed_sets() {
        let err = PermissionString::build("spaceship", "read").unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation {
                kind: ValidationKind::InvalidType,
                ..
            }
        ));
        let err = PermissionString::build("order", "write").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_INVALID_TYPE");
    }

    #[test]
    fn covers_honours_wildcards_on_each_side() {
        let required = PermissionString::parse("order:read").unwrap();
        for grant in ["*:*", "order:*", "*:read", "order:read"] {
            assert!(PermissionString::parse(grant).unwrap().covers(&required), "{grant}");
        }
        for grant in ["order:update", "product:*", "*:delete"] {
            assert!(!PermissionString::parse(grant).unwrap().covers(&required), "{grant}");
        }
    }

    #[test]
    fn wildcard_permission_is_flagged_dangerous() {
        let p = NewPermission::wildcard()
            .into_permission(TenantId::new(), None, Utc::now())
            .unwrap();
        assert!(p.permission_string.is_wildcard());
        assert!(p.is_dangerous);
        assert_eq!(p.display_name, "Full Access");
    }

    #[test]
    fn serde_rejects_malformed_strings() {
        let ok: PermissionString = serde_json::from_str("\"role:create\"").unwrap();
        assert_eq!(ok.resource(), "role");
        assert!(serde_json::from_str::<PermissionString>("\"role-create\"").is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Every pair from the closed enumerations builds and re-parses to itself.
        #[test]
        fn closed_pairs_always_build(r in 0usize..ResourceType::ALL.len(), a in 0usize..Action::ALL.len()) {
            let resource = ResourceType::ALL[r];
            let action = Action::ALL[a];
            let built = PermissionString::build(resource.as_str(), action.as_str()).unwrap();
            prop_assert_eq!(built.clone(), PermissionString::parse(built.as_str()).unwrap());
            prop_assert_eq!(built.resource(), resource.as_str());
            prop_assert_eq!(built.action(), action.as_str());
        }

        /// Anything with zero or several colons is rejected.
        #[test]
        fn colon_count_other_than_one_is_rejected(parts in prop::collection::vec("[a-z]{1,6}", 1..5)) {
            prop_assume!(parts.len() != 2);
            let raw = parts.join(":");
            prop_assert!(PermissionString::parse(&raw).is_err());
        }
    }
}
