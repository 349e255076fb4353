//! Credential store key layout.
//!
//! - access record: `tokens:{tenant}:{user}` (one per user, overwritten on issue)
//! - refresh record: `refresh_tokens:{tenant}:{user}:{token_id}`
//! - index sets: `user_access_tokens:{tenant}:{user}`, `user_refresh_tokens:{tenant}:{user}`

use warden_core::{TenantId, TokenId, UserId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub const ALL: [TokenKind; 2] = [TokenKind::Access, TokenKind::Refresh];

    fn record_namespace(&self) -> &'static str {
        match self {
            TokenKind::Access => "tokens",
            TokenKind::Refresh => "refresh_tokens",
        }
    }

    fn index_namespace(&self) -> &'static str {
        match self {
            TokenKind::Access => "user_access_tokens",
            TokenKind::Refresh => "user_refresh_tokens",
        }
    }

    /// Prefix matching every record of this kind in a tenant.
    pub fn tenant_prefix(&self, tenant_id: TenantId) -> String {
        format!("{}:{tenant_id}:", self.record_namespace())
    }

    pub fn index_key(&self, tenant_id: TenantId, user_id: UserId) -> String {
        format!("{}:{tenant_id}:{user_id}", self.index_namespace())
    }

    pub fn tenant_index_prefix(&self, tenant_id: TenantId) -> String {
        format!("{}:{tenant_id}:", self.index_namespace())
    }
}

impl core::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

pub fn access_key(tenant_id: TenantId, user_id: UserId) -> String {
    format!("{}{user_id}", TokenKind::Access.tenant_prefix(tenant_id))
}

pub fn refresh_key(tenant_id: TenantId, user_id: UserId, token_id: &TokenId) -> String {
    format!("{}{user_id}:{token_id}", TokenKind::Refresh.tenant_prefix(tenant_id))
}
