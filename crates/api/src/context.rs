use chrono::{DateTime, Utc};

use warden_core::{RoleId, TenantId, TokenId, UserId};
use warden_infra::ValidatedAccessToken;

/// Authenticated identity behind a request.
///
/// Only ever built from an access token that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    tenant_id: TenantId,
    user_id: UserId,
    username: String,
    roles: Vec<RoleId>,
    token_id: TokenId,
    expires_at: DateTime<Utc>,
}

impl Caller {
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Role ids as stamped into the token at issuance.
    pub fn roles(&self) -> &[RoleId] {
        &self.roles
    }

    pub fn token_id(&self) -> &TokenId {
        &self.token_id
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is(&self, tenant_id: TenantId, user_id: UserId) -> bool {
        self.tenant_id == tenant_id && self.user_id == user_id
    }
}

impl From<ValidatedAccessToken> for Caller {
    fn from(value: ValidatedAccessToken) -> Self {
        Self {
            tenant_id: value.claims.tenant_id,
            user_id: value.claims.sub,
            username: value.claims.username,
            roles: value.claims.roles,
            token_id: value.record.token_id,
            expires_at: value.record.expires_at,
        }
    }
}
