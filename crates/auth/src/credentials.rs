//! Stored credential records.
//!
//! These are what the credential store holds. The raw token strings are handed
//! to the client once and never persisted; records are found by key and tied to
//! the presented token through its digest.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use warden_core::{RoleId, TenantId, TokenId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevokeReason {
    Logout,
    Rotation,
    Administrative,
    /// A rotated refresh token was presented again.
    ReuseDetected,
    TenantDeleted,
}

/// Revocation stamp shared by both record kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    pub revoked_by: Option<UserId>,
    pub revoked_at: DateTime<Utc>,
    pub reason: RevokeReason,
}

/// The single active access credential of a `(tenant, user)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenRecord {
    pub token_id: TokenId,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    #[serde(default)]
    pub revocation: Option<Revocation>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// One of possibly many refresh credentials of a `(tenant, user)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub token_id: TokenId,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    #[serde(default)]
    pub revocation: Option<Revocation>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Behaviour shared by both stored credential kinds.
pub trait CredentialRecord: Serialize + DeserializeOwned {
    fn token_id(&self) -> &TokenId;

    fn expires_at(&self) -> DateTime<Utc>;

    fn is_revoked(&self) -> bool;

    fn revoke(&mut self, revoked_by: Option<UserId>, reason: RevokeReason, now: DateTime<Utc>);

    fn revoke_reason(&self) -> Option<RevokeReason>;

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// Time left before the record expires on its own; zero when past.
    fn remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        (self.expires_at() - now).max(chrono::Duration::zero())
    }
}

macro_rules! impl_credential_record {
    ($t:ty) => {
        impl CredentialRecord for $t {
            fn token_id(&self) -> &TokenId {
                &self.token_id
            }

            fn expires_at(&self) -> DateTime<Utc> {
                self.expires_at
            }

            fn is_revoked(&self) -> bool {
                self.revoked
            }

            fn revoke(&mut self, revoked_by: Option<UserId>, reason: RevokeReason, now: DateTime<Utc>) {
                self.revoked = true;
                self.revocation = Some(Revocation {
                    revoked_by,
                    revoked_at: now,
                    reason,
                });
            }

            fn revoke_reason(&self) -> Option<RevokeReason> {
                self.revocation.as_ref().map(|r| r.reason)
            }
        }
    };
}

impl_credential_record!(AccessTokenRecord);
impl_credential_record!(RefreshTokenRecord);

/// Who a token is minted for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSubject {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub roles: Vec<RoleId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedAccessToken {
    pub token: String,
    pub record: AccessTokenRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub record: RefreshTokenRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access: IssuedAccessToken,
    pub refresh: IssuedRefreshToken,
}

/// Cryptographically random opaque refresh token (32 bytes, URL-safe).
pub fn generate_refresh_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rand::Rng::random(&mut rng);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn refresh_tokens_are_url_safe_and_unique() {
        let a = generate_refresh_token();
        let b = generate_refresh_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn revoke_stamps_reason_and_actor() {
        let now = Utc::now();
        let admin = UserId::new();
        let mut record = RefreshTokenRecord {
            token_id: TokenId::new("t"),
            tenant_id: TenantId::new(),
            user_id: UserId::new(),
            issued_at: now,
            expires_at: now + Duration::hours(1),
            revoked: false,
            revocation: None,
            last_used_at: None,
            scopes: vec![],
        };
        record.revoke(Some(admin), RevokeReason::Rotation, now);
        assert!(record.revoked);
        assert_eq!(record.revoke_reason(), Some(RevokeReason::Rotation));
        assert_eq!(record.revocation.as_ref().unwrap().revoked_by, Some(admin));
        assert_eq!(record.remaining(now + Duration::hours(2)), Duration::zero());
    }
}
