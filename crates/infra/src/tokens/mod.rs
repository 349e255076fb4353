//! Token lifecycle: issuing, validating, rotating and revoking credentials.

pub mod index;
pub mod keys;
pub mod manager;

use chrono::Duration;

pub use index::TokenIndex;
pub use keys::{TokenKind, access_key, refresh_key};
pub use manager::{RevocationSummary, TokenLifecycleManager, ValidatedAccessToken};

/// Default issuer claim stamped on access tokens.
pub const DEFAULT_ISSUER: &str = "warden";

#[derive(Clone)]
pub struct TokenSettings {
    pub signing_secret: String,
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Presenting an already rotated refresh token revokes every token of its owner.
    pub revoke_all_on_refresh_reuse: bool,
    /// An expired refresh record stays readable this long, so late presentations
    /// fail as expired rather than unknown.
    pub expired_refresh_retention: Duration,
}

impl TokenSettings {
    pub fn new(signing_secret: impl Into<String>) -> Self {
        Self {
            signing_secret: signing_secret.into(),
            issuer: DEFAULT_ISSUER.to_string(),
            access_ttl: Duration::hours(1),
            refresh_ttl: Duration::hours(168),
            revoke_all_on_refresh_reuse: true,
            expired_refresh_retention: Duration::hours(24),
        }
    }
}

impl core::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("signing_secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("revoke_all_on_refresh_reuse", &self.revoke_all_on_refresh_reuse)
            .field("expired_refresh_retention", &self.expired_refresh_retention)
            .finish()
    }
}
