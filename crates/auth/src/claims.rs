//! Access-token claims and the HS256 codec.
//!
//! The signature proves a token was minted here; whether it is still usable is
//! decided by the credential record in the store. Expiry is therefore checked
//! against the service clock by [`validate_claims`], not by the JWT library.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use warden_core::{AppError, AppResult, AuthErrorKind, RoleId, TenantId, TokenId, UserId};

/// Claims embedded in every access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user id).
    pub sub: UserId,
    pub tenant_id: TenantId,
    pub username: String,
    pub email: String,
    pub roles: Vec<RoleId>,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
    /// Unique per issuance so two tokens minted in the same second differ.
    pub jti: String,
    pub iss: String,
}

impl AccessTokenClaims {
    pub fn issued_at(&self) -> DateTime<Utc> {
        timestamp(self.iat)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        timestamp(self.exp)
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

impl From<TokenValidationError> for AppError {
    fn from(value: TokenValidationError) -> Self {
        match value {
            TokenValidationError::Expired => AppError::auth(AuthErrorKind::TokenExpired),
            TokenValidationError::NotYetValid | TokenValidationError::InvalidTimeWindow => {
                AppError::auth(AuthErrorKind::TokenInvalid)
            }
        }
    }
}

/// Tolerated clock skew between token minting and validation.
const CLOCK_SKEW_SECS: i64 = 5;

/// Deterministically validate the time window of decoded claims.
pub fn validate_claims(
    claims: &AccessTokenClaims,
    now: DateTime<Utc>,
) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now.timestamp() + CLOCK_SKEW_SECS < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now.timestamp() > claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

/// Digest used as the storage identity of a credential.
pub fn token_digest(token: &str) -> TokenId {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    TokenId::new(hex::encode(hasher.finalize()))
}

/// HS256 signer/verifier for access tokens.
#[derive(Clone)]
pub struct JwtCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl core::fmt::Debug for JwtCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JwtCodec")
            .field("issuer", &self.validation.iss)
            .finish_non_exhaustive()
    }
}

impl JwtCodec {
    pub fn new(secret: &[u8], issuer: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iss"]);
        validation.validate_exp = false;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn encode(&self, claims: &AccessTokenClaims) -> AppResult<String> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AppError::internal(format!("failed to sign access token: {e}")))
    }

    /// Verify signature and issuer. Any failure is an invalid token.
    pub fn decode(&self, token: &str) -> AppResult<AccessTokenClaims> {
        jsonwebtoken::decode::<AccessTokenClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "access token rejected by codec");
                AppError::auth(AuthErrorKind::TokenInvalid)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(now: DateTime<Utc>, ttl: Duration) -> AccessTokenClaims {
        AccessTokenClaims {
            sub: UserId::new(),
            tenant_id: TenantId::new(),
            username: "ada".into(),
            email: "ada@acme.test".into(),
            roles: vec![RoleId::new()],
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: uuid::Uuid::now_v7().to_string(),
            iss: "warden".into(),
        }
    }

    #[test]
    fn encode_then_decode_preserves_claims() {
        let codec = JwtCodec::new(b"secret", "warden");
        let original = claims(Utc::now(), Duration::minutes(15));
        let token = codec.encode(&original).unwrap();
        assert_eq!(codec.decode(&token).unwrap(), original);
    }

    #[test]
    fn decode_ignores_expiry_but_checks_signature() {
        let codec = JwtCodec::new(b"secret", "warden");
        let stale = claims(Utc::now() - Duration::days(2), Duration::hours(1));
        let token = codec.encode(&stale).unwrap();
        assert!(codec.decode(&token).is_ok());

        let other = JwtCodec::new(b"other-secret", "warden");
        let err = other.decode(&token).unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthErrorKind::TokenInvalid));
    }

    #[test]
    fn wrong_issuer_is_invalid() {
        let token = JwtCodec::new(b"secret", "someone-else")
            .encode(&AccessTokenClaims {
                iss: "someone-else".into(),
                ..claims(Utc::now(), Duration::minutes(5))
            })
            .unwrap();
        assert!(JwtCodec::new(b"secret", "warden").decode(&token).is_err());
    }

    #[test]
    fn validate_claims_time_window() {
        let now = Utc::now();
        assert_eq!(validate_claims(&claims(now, Duration::minutes(1)), now), Ok(()));
        assert_eq!(
            validate_claims(&claims(now, Duration::minutes(1)), now + Duration::minutes(2)),
            Err(TokenValidationError::Expired)
        );
        assert_eq!(
            validate_claims(&claims(now, Duration::zero()), now),
            Err(TokenValidationError::InvalidTimeWindow)
        );
        assert_eq!(
            validate_claims(&claims(now + Duration::hours(1), Duration::minutes(1)), now),
            Err(TokenValidationError::NotYetValid)
        );
    }

    #[test]
    fn digest_is_stable_hex() {
        let a = token_digest("abc");
        assert_eq!(a, token_digest("abc"));
        assert_eq!(a.as_str().len(), 64);
        assert_ne!(a, token_digest("abd"));
    }
}
