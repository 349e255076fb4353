//! User account model.
//!
//! A user belongs to exactly one tenant. Authorization data lives on the record
//! itself: role assignments, extra grants layered on top of roles, and explicit
//! denials that override any grant for the same permission string.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{AppError, AppResult, RoleId, TenantId, UserId, ValidationKind};

use crate::permissions::PermissionString;
use crate::roles::RoleAssignment;

/// Only the most recent attempts are kept.
pub const MAX_LOGIN_HISTORY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
    Suspended,
    Invited,
}

impl FromStr for UserStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserStatus::Active),
            "inactive" => Ok(UserStatus::Inactive),
            "suspended" => Ok(UserStatus::Suspended),
            "invited" => Ok(UserStatus::Invited),
            other => Err(AppError::invalid_type(format!("unknown user status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRecord {
    pub at: DateTime<Utc>,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub status: UserStatus,
    pub roles: Vec<RoleAssignment>,
    pub additional_permissions: Vec<PermissionString>,
    pub revoked_permissions: Vec<PermissionString>,
    pub login_history: Vec<LoginRecord>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by the store on every write; a write carrying an older version is refused.
    #[serde(default)]
    pub version: u64,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    /// Role ids whose assignment has not expired at `now`.
    pub fn live_role_ids(&self, now: DateTime<Utc>) -> Vec<RoleId> {
        self.roles
            .iter()
            .filter(|a| a.is_live(now))
            .map(|a| a.role_id)
            .collect()
    }

    pub fn record_login(&mut self, at: DateTime<Utc>, success: bool) {
        self.login_history.push(LoginRecord { at, success });
        if self.login_history.len() > MAX_LOGIN_HISTORY {
            let excess = self.login_history.len() - MAX_LOGIN_HISTORY;
            self.login_history.drain(..excess);
        }
    }

    pub fn last_successful_login(&self) -> Option<DateTime<Utc>> {
        self.login_history
            .iter()
            .rev()
            .find(|r| r.success)
            .map(|r| r.at)
    }

    /// Adds or replaces the assignment for the same role.
    pub fn assign_role(&mut self, assignment: RoleAssignment) {
        self.roles.retain(|a| a.role_id != assignment.role_id);
        self.roles.push(assignment);
    }

    pub fn unassign_role(&mut self, role_id: RoleId) -> bool {
        let before = self.roles.len();
        self.roles.retain(|a| a.role_id != role_id);
        before != self.roles.len()
    }

    pub fn grant_permission(&mut self, permission: PermissionString) {
        if !self.additional_permissions.contains(&permission) {
            self.additional_permissions.push(permission);
        }
    }

    pub fn withdraw_permission(&mut self, permission: &PermissionString) -> bool {
        let before = self.additional_permissions.len();
        self.additional_permissions.retain(|p| p != permission);
        before != self.additional_permissions.len()
    }

    pub fn deny_permission(&mut self, permission: PermissionString) {
        if !self.revoked_permissions.contains(&permission) {
            self.revoked_permissions.push(permission);
        }
    }

    pub fn lift_denial(&mut self, permission: &PermissionString) -> bool {
        let before = self.revoked_permissions.len();
        self.revoked_permissions.retain(|p| p != permission);
        before != self.revoked_permissions.len()
    }
}

/// Input for creating a user. The password arrives in clear and is hashed by the
/// caller once policy checks pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    /// Defaults to the email address.
    #[serde(default)]
    pub username: Option<String>,
    pub password: String,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default)]
    pub roles: Vec<RoleId>,
}

impl NewUser {
    /// Normalised `(email, username)` after shape checks.
    pub fn validate(&self) -> AppResult<(String, String)> {
        let email = self.email.trim().to_ascii_lowercase();
        if email.is_empty() {
            return Err(AppError::missing_field("email"));
        }
        if !is_plausible_email(&email) {
            return Err(AppError::validation(
                ValidationKind::InvalidFormat,
                format!("'{email}' is not a valid email address"),
            ));
        }

        let username = match &self.username {
            Some(u) if !u.trim().is_empty() => u.trim().to_string(),
            _ => email.clone(),
        };
        if username.chars().any(char::is_whitespace) {
            return Err(AppError::invalid_format("username must not contain whitespace"));
        }

        if self.password.is_empty() {
            return Err(AppError::missing_field("password"));
        }
        Ok((email, username))
    }

    pub fn into_user(
        self,
        tenant_id: TenantId,
        password_hash: String,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> AppResult<User> {
        let (email, username) = self.validate()?;
        let roles = self
            .roles
            .into_iter()
            .map(|role_id| RoleAssignment::new(role_id, tenant_id, created_by, now))
            .collect();

        Ok(User {
            id: UserId::new(),
            tenant_id,
            email,
            username,
            password_hash,
            status: self.status,
            roles,
            additional_permissions: Vec::new(),
            revoked_permissions: Vec::new(),
            login_history: Vec::new(),
            created_by,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}
