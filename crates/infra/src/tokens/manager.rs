use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use warden_auth::{
    AccessTokenClaims, AccessTokenRecord, CredentialRecord, IssuedAccessToken, IssuedRefreshToken, JwtCodec,
    RefreshTokenRecord, RevokeReason, TokenPair, TokenSubject, TokenValidationError, generate_refresh_token,
    token_digest, validate_claims,
};
use warden_core::{AppError, AppResult, AuthErrorKind, Clock, RequestContext, TenantId, TokenId, UserId};

use super::TokenSettings;
use super::index::TokenIndex;
use super::keys::{TokenKind, access_key, refresh_key};
use crate::credential_store::{CredentialStore, StoreError};

/// Outcome of a bulk revocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RevocationSummary {
    pub access: usize,
    pub refresh: usize,
    /// Records that could not be read or written. The bulk operation carries on past them.
    pub failed: usize,
}

impl RevocationSummary {
    pub fn total(&self) -> usize {
        self.access + self.refresh
    }

    fn tally(&mut self, kind: TokenKind, key: &str, outcome: AppResult<bool>) {
        match outcome {
            Ok(true) => match kind {
                TokenKind::Access => self.access += 1,
                TokenKind::Refresh => self.refresh += 1,
            },
            Ok(false) => {}
            Err(e) => {
                self.failed += 1;
                warn!(key = %key, kind = %kind, error = %e, "failed to revoke token");
            }
        }
    }
}

/// A presented access token that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAccessToken {
    pub claims: AccessTokenClaims,
    pub record: AccessTokenRecord,
}

enum Loaded<R> {
    Missing,
    Corrupt,
    Present(R),
}

fn invalid() -> AppError {
    AppError::auth(AuthErrorKind::TokenInvalid)
}

/// Credential records whose kind is known statically.
trait StoredRecord: CredentialRecord {
    const KIND: TokenKind;
}

impl StoredRecord for AccessTokenRecord {
    const KIND: TokenKind = TokenKind::Access;
}

impl StoredRecord for RefreshTokenRecord {
    const KIND: TokenKind = TokenKind::Refresh;
}

/// Store expiry: the given lifetime, at least one second.
fn ttl_for(remaining: chrono::Duration) -> std::time::Duration {
    remaining
        .to_std()
        .unwrap_or_default()
        .max(std::time::Duration::from_secs(1))
}

/// Issues and tracks access/refresh credentials in the credential store.
///
/// A user has at most one access record (issuing overwrites it) and any number
/// of refresh records. Validity is always decided by the stored record, the
/// index is only used to enumerate a user's tokens.
pub struct TokenLifecycleManager {
    store: Arc<dyn CredentialStore>,
    index: TokenIndex,
    codec: JwtCodec,
    clock: Arc<dyn Clock>,
    settings: TokenSettings,
}

impl core::fmt::Debug for TokenLifecycleManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenLifecycleManager")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl TokenLifecycleManager {
    pub fn new(store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>, settings: TokenSettings) -> Self {
        let codec = JwtCodec::new(settings.signing_secret.as_bytes(), &settings.issuer);
        Self {
            index: TokenIndex::new(store.clone()),
            store,
            codec,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    /// Signature and issuer check only. Says nothing about revocation or expiry.
    pub fn decode_access_token(&self, token: &str) -> AppResult<AccessTokenClaims> {
        self.codec.decode(token)
    }

    fn load<R: CredentialRecord>(&self, ctx: &RequestContext, key: &str) -> Result<Loaded<R>, StoreError> {
        let Some(raw) = self.store.get(ctx, key)? else {
            return Ok(Loaded::Missing);
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Loaded::Present(record)),
            Err(e) => {
                warn!(key = %key, error = %e, "unreadable credential record");
                Ok(Loaded::Corrupt)
            }
        }
    }

    fn save<R: StoredRecord>(
        &self,
        ctx: &RequestContext,
        key: &str,
        record: &R,
        now: chrono::DateTime<chrono::Utc>,
    ) -> AppResult<()> {
        let value = serde_json::to_string(record)
            .map_err(|e| AppError::internal(format!("failed to encode credential record: {e}")))?;
        let linger = match R::KIND {
            TokenKind::Access => chrono::Duration::zero(),
            TokenKind::Refresh => self.settings.expired_refresh_retention,
        };
        self.store.set(ctx, key, &value, ttl_for(record.remaining(now) + linger))?;
        Ok(())
    }

    fn unindex(&self, ctx: &RequestContext, kind: TokenKind, tenant_id: TenantId, user_id: UserId, token_id: &TokenId) {
        if let Err(e) = self.index.unregister(ctx, kind, tenant_id, user_id, token_id) {
            warn!(tenant_id = %tenant_id, user_id = %user_id, kind = %kind, error = %e, "failed to update token index");
        }
    }

    #[instrument(skip(self, ctx, subject, scopes), fields(tenant_id = %subject.tenant_id, user_id = %subject.user_id), err)]
    pub fn issue_access_token(
        &self,
        ctx: &RequestContext,
        subject: &TokenSubject,
        scopes: Vec<String>,
    ) -> AppResult<IssuedAccessToken> {
        let now = self.clock.now();
        let expires_at = now + self.settings.access_ttl;
        let claims = AccessTokenClaims {
            sub: subject.user_id,
            tenant_id: subject.tenant_id,
            username: subject.username.clone(),
            email: subject.email.clone(),
            roles: subject.roles.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::now_v7().to_string(),
            iss: self.settings.issuer.clone(),
        };
        let token = self.codec.encode(&claims)?;
        let record = AccessTokenRecord {
            token_id: token_digest(&token),
            tenant_id: subject.tenant_id,
            user_id: subject.user_id,
            issued_at: now,
            expires_at,
            revoked: false,
            revocation: None,
            scopes,
        };

        self.save(ctx, &access_key(subject.tenant_id, subject.user_id), &record, now)?;
        self.index.register(
            ctx,
            TokenKind::Access,
            subject.tenant_id,
            subject.user_id,
            &record.token_id,
            ttl_for(self.settings.access_ttl),
        )?;
        self.prune_access_index(ctx, subject.tenant_id, subject.user_id, &record.token_id);
        debug!(token_id = %record.token_id, "access token issued");
        Ok(IssuedAccessToken { token, record })
    }

    #[instrument(skip(self, ctx, scopes), err)]
    pub fn issue_refresh_token(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
        scopes: Vec<String>,
    ) -> AppResult<IssuedRefreshToken> {
        let now = self.clock.now();
        let token = generate_refresh_token();
        let record = RefreshTokenRecord {
            token_id: token_digest(&token),
            tenant_id,
            user_id,
            issued_at: now,
            expires_at: now + self.settings.refresh_ttl,
            revoked: false,
            revocation: None,
            last_used_at: None,
            scopes,
        };

        self.save(ctx, &refresh_key(tenant_id, user_id, &record.token_id), &record, now)?;
        self.index.register(
            ctx,
            TokenKind::Refresh,
            tenant_id,
            user_id,
            &record.token_id,
            ttl_for(self.settings.refresh_ttl + self.settings.expired_refresh_retention),
        )?;
        debug!(token_id = %record.token_id, "refresh token issued");
        Ok(IssuedRefreshToken { token, record })
    }

    /// Refresh first, then access: a failure leaves no usable access token behind.
    pub fn issue_pair(&self, ctx: &RequestContext, subject: &TokenSubject, scopes: Vec<String>) -> AppResult<TokenPair> {
        let refresh = self.issue_refresh_token(ctx, subject.tenant_id, subject.user_id, scopes.clone())?;
        let access = self.issue_access_token(ctx, subject, scopes)?;
        Ok(TokenPair { access, refresh })
    }

    /// Verify signature, then the stored record: presence, identity, revocation, expiry.
    pub fn validate_access_token(&self, ctx: &RequestContext, token: &str) -> AppResult<ValidatedAccessToken> {
        let claims = self.codec.decode(token)?;
        let now = self.clock.now();

        let record = match self.load::<AccessTokenRecord>(ctx, &access_key(claims.tenant_id, claims.sub))? {
            Loaded::Present(record) => record,
            Loaded::Corrupt => return Err(invalid()),
            // The record expires with the token, so an absent record for a
            // well-signed but stale token is an expiry, not a forgery.
            Loaded::Missing => {
                return Err(match validate_claims(&claims, now) {
                    Err(TokenValidationError::Expired) => AppError::auth(AuthErrorKind::TokenExpired),
                    _ => invalid(),
                });
            }
        };

        // superseded by a newer issuance
        if record.token_id != token_digest(token) {
            return Err(invalid());
        }
        if record.revoked {
            return Err(AppError::auth(AuthErrorKind::TokenRevoked));
        }
        if record.is_expired(now) {
            return Err(AppError::auth(AuthErrorKind::TokenExpired));
        }
        validate_claims(&claims, now)?;

        Ok(ValidatedAccessToken { claims, record })
    }

    fn check_refresh(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
        token: &str,
    ) -> AppResult<(String, RefreshTokenRecord)> {
        let token_id = token_digest(token);
        let key = refresh_key(tenant_id, user_id, &token_id);
        let record = match self.load::<RefreshTokenRecord>(ctx, &key)? {
            Loaded::Present(record) if record.token_id == token_id => record,
            // past expiry plus retention, or never issued
            _ => return Err(invalid()),
        };

        if record.revoked {
            if record.revoke_reason() == Some(RevokeReason::Rotation) && self.settings.revoke_all_on_refresh_reuse {
                warn!(
                    target: "audit",
                    tenant_id = %tenant_id,
                    user_id = %user_id,
                    "rotated refresh token presented again, revoking all tokens of the user"
                );
                let summary =
                    self.revoke_user_tokens(&ctx.detached(), tenant_id, user_id, None, RevokeReason::ReuseDetected);
                info!(
                    target: "audit",
                    tenant_id = %tenant_id,
                    user_id = %user_id,
                    access = summary.access,
                    refresh = summary.refresh,
                    failed = summary.failed,
                    "tokens revoked after refresh token reuse"
                );
            }
            return Err(AppError::auth(AuthErrorKind::TokenRevoked));
        }
        if record.is_expired(self.clock.now()) {
            return Err(AppError::auth(AuthErrorKind::TokenExpired));
        }
        Ok((key, record))
    }

    /// Check a refresh token and stamp its last use. The stamp is best effort.
    pub fn validate_refresh_token(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
        token: &str,
    ) -> AppResult<RefreshTokenRecord> {
        let (key, mut record) = self.check_refresh(ctx, tenant_id, user_id, token)?;
        let now = self.clock.now();
        record.last_used_at = Some(now);
        if let Err(e) = self.save(ctx, &key, &record, now) {
            warn!(tenant_id = %tenant_id, user_id = %user_id, error = %e, "failed to record refresh token use");
        }
        Ok(record)
    }

    /// Exchange a live refresh token for a new pair.
    ///
    /// The new pair is stored before the old token is revoked, so a failure
    /// part way never leaves the user without a working credential. Index
    /// cleanup afterwards is best effort.
    #[instrument(skip(self, ctx, subject, old_token), fields(tenant_id = %subject.tenant_id, user_id = %subject.user_id), err)]
    pub fn rotate_refresh_token(
        &self,
        ctx: &RequestContext,
        subject: &TokenSubject,
        old_token: &str,
        rotated_by: Option<UserId>,
    ) -> AppResult<TokenPair> {
        let (old_key, old) = self.check_refresh(ctx, subject.tenant_id, subject.user_id, old_token)?;
        let pair = self.issue_pair(ctx, subject, old.scopes.clone())?;

        let revoked = self.revoke_record::<RefreshTokenRecord>(
            ctx,
            &old_key,
            Some(&old.token_id),
            rotated_by,
            RevokeReason::Rotation,
        )?;
        if !revoked {
            warn!(token_id = %old.token_id, "refresh token was already revoked during rotation");
        }

        self.unindex(ctx, TokenKind::Refresh, subject.tenant_id, subject.user_id, &old.token_id);

        info!(
            target: "audit",
            tenant_id = %subject.tenant_id,
            user_id = %subject.user_id,
            old_token_id = %old.token_id,
            new_token_id = %pair.refresh.record.token_id,
            "refresh token rotated"
        );
        Ok(pair)
    }

    /// Drop index entries of access tokens other than `keep`; they point at an overwritten slot.
    fn prune_access_index(&self, ctx: &RequestContext, tenant_id: TenantId, user_id: UserId, keep: &TokenId) {
        match self.index.members(ctx, TokenKind::Access, tenant_id, user_id) {
            Ok(ids) => ids
                .iter()
                .filter(|id| *id != keep)
                .for_each(|id| self.unindex(ctx, TokenKind::Access, tenant_id, user_id, id)),
            Err(e) => warn!(tenant_id = %tenant_id, user_id = %user_id, error = %e, "failed to read token index"),
        }
    }

    /// Soft-revoke the record at `key`. `Ok(false)` when there was nothing live to revoke.
    fn revoke_record<R: StoredRecord>(
        &self,
        ctx: &RequestContext,
        key: &str,
        expected: Option<&TokenId>,
        revoked_by: Option<UserId>,
        reason: RevokeReason,
    ) -> AppResult<bool> {
        let mut record = match self.load::<R>(ctx, key)? {
            Loaded::Present(record) => record,
            Loaded::Missing => return Ok(false),
            // unusable either way
            Loaded::Corrupt => return Ok(self.store.delete(ctx, key)?),
        };
        if expected.is_some_and(|id| id != record.token_id()) || record.is_revoked() {
            return Ok(false);
        }
        let now = self.clock.now();
        if record.is_expired(now) {
            return Ok(false);
        }
        record.revoke(revoked_by, reason, now);
        self.save(ctx, key, &record, now)?;
        Ok(true)
    }

    /// Revoke a presented access token. Idempotent; a forged token is rejected.
    pub fn revoke_access_token(
        &self,
        ctx: &RequestContext,
        token: &str,
        revoked_by: Option<UserId>,
    ) -> AppResult<bool> {
        let claims = self.codec.decode(token)?;
        let reason = if revoked_by == Some(claims.sub) {
            RevokeReason::Logout
        } else {
            RevokeReason::Administrative
        };
        let token_id = token_digest(token);
        let revoked = self.revoke_record::<AccessTokenRecord>(
            ctx,
            &access_key(claims.tenant_id, claims.sub),
            Some(&token_id),
            revoked_by,
            reason,
        )?;
        if revoked {
            info!(
                target: "audit",
                tenant_id = %claims.tenant_id,
                user_id = %claims.sub,
                token_id = %token_id,
                ?reason,
                "access token revoked"
            );
        }
        Ok(revoked)
    }

    /// Revoke whatever access token a user currently holds.
    pub fn revoke_user_access(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
        revoked_by: Option<UserId>,
    ) -> AppResult<bool> {
        let revoked = self.revoke_record::<AccessTokenRecord>(
            ctx,
            &access_key(tenant_id, user_id),
            None,
            revoked_by,
            RevokeReason::Administrative,
        )?;
        if revoked {
            info!(target: "audit", tenant_id = %tenant_id, user_id = %user_id, "access token revoked");
        }
        Ok(revoked)
    }

    pub fn revoke_refresh_token(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
        token: &str,
        revoked_by: Option<UserId>,
        is_rotation: bool,
    ) -> AppResult<bool> {
        let reason = match (is_rotation, revoked_by) {
            (true, _) => RevokeReason::Rotation,
            (false, Some(by)) if by == user_id => RevokeReason::Logout,
            (false, _) => RevokeReason::Administrative,
        };
        let token_id = token_digest(token);
        let revoked = self.revoke_record::<RefreshTokenRecord>(
            ctx,
            &refresh_key(tenant_id, user_id, &token_id),
            Some(&token_id),
            revoked_by,
            reason,
        )?;
        if revoked {
            info!(
                target: "audit",
                tenant_id = %tenant_id,
                user_id = %user_id,
                token_id = %token_id,
                ?reason,
                "refresh token revoked"
            );
        }
        Ok(revoked)
    }

    /// Remove the access record outright instead of marking it revoked.
    pub fn delete_access_token(&self, ctx: &RequestContext, tenant_id: TenantId, user_id: UserId) -> AppResult<bool> {
        let key = access_key(tenant_id, user_id);
        let token_id = match self.load::<AccessTokenRecord>(ctx, &key)? {
            Loaded::Present(record) => Some(record.token_id),
            Loaded::Missing | Loaded::Corrupt => None,
        };
        let deleted = self.store.delete(ctx, &key)?;
        if let Some(id) = token_id {
            self.unindex(ctx, TokenKind::Access, tenant_id, user_id, &id);
        }
        Ok(deleted)
    }

    pub fn delete_refresh_token(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
        token: &str,
    ) -> AppResult<bool> {
        let token_id = token_digest(token);
        let deleted = self.store.delete(ctx, &refresh_key(tenant_id, user_id, &token_id))?;
        self.unindex(ctx, TokenKind::Refresh, tenant_id, user_id, &token_id);
        Ok(deleted)
    }

    /// Revoke every token of a user, carrying on past individual failures.
    pub fn revoke_all_for_user(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
        revoked_by: Option<UserId>,
    ) -> AppResult<RevocationSummary> {
        ctx.check()?;
        let summary = self.revoke_user_tokens(ctx, tenant_id, user_id, revoked_by, RevokeReason::Administrative);
        info!(
            target: "audit",
            tenant_id = %tenant_id,
            user_id = %user_id,
            access = summary.access,
            refresh = summary.refresh,
            failed = summary.failed,
            "all user tokens revoked"
        );
        Ok(summary)
    }

    fn revoke_user_tokens(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        user_id: UserId,
        revoked_by: Option<UserId>,
        reason: RevokeReason,
    ) -> RevocationSummary {
        let mut summary = RevocationSummary::default();

        let key = access_key(tenant_id, user_id);
        let outcome = self.revoke_record::<AccessTokenRecord>(ctx, &key, None, revoked_by, reason);
        summary.tally(TokenKind::Access, &key, outcome);

        match self.index.members(ctx, TokenKind::Refresh, tenant_id, user_id) {
            Ok(ids) => {
                for id in ids {
                    let key = refresh_key(tenant_id, user_id, &id);
                    let outcome = self.revoke_record::<RefreshTokenRecord>(ctx, &key, None, revoked_by, reason);
                    summary.tally(TokenKind::Refresh, &key, outcome);
                }
            }
            Err(e) => {
                summary.failed += 1;
                warn!(tenant_id = %tenant_id, user_id = %user_id, error = %e, "failed to read token index");
            }
        }

        // keep the index while anything is left unrevoked, it is the only way back to those tokens
        if summary.failed == 0 {
            if let Err(e) = self.index.clear(ctx, tenant_id, user_id) {
                warn!(tenant_id = %tenant_id, user_id = %user_id, error = %e, "failed to clear token index");
            }
        }
        summary
    }

    /// Revoke every token in a tenant by scanning its key prefixes.
    ///
    /// A failed scan aborts with an error; failures on individual records are
    /// counted and skipped.
    #[instrument(skip(self, ctx), err)]
    pub fn revoke_all_for_tenant(
        &self,
        ctx: &RequestContext,
        tenant_id: TenantId,
        revoked_by: Option<UserId>,
        reason: RevokeReason,
    ) -> AppResult<RevocationSummary> {
        let mut summary = RevocationSummary::default();
        for kind in TokenKind::ALL {
            for key in self.store.scan_prefix(ctx, &kind.tenant_prefix(tenant_id))? {
                let outcome = match kind {
                    TokenKind::Access => {
                        self.revoke_record::<AccessTokenRecord>(ctx, &key, None, revoked_by, reason)
                    }
                    TokenKind::Refresh => {
                        self.revoke_record::<RefreshTokenRecord>(ctx, &key, None, revoked_by, reason)
                    }
                };
                summary.tally(kind, &key, outcome);
            }
        }

        if summary.failed == 0 {
            if let Err(e) = self.index.clear_tenant(ctx, tenant_id) {
                warn!(tenant_id = %tenant_id, error = %e, "failed to clear tenant token index");
            }
        }
        info!(
            target: "audit",
            tenant_id = %tenant_id,
            access = summary.access,
            refresh = summary.refresh,
            failed = summary.failed,
            ?reason,
            "all tenant tokens revoked"
        );
        Ok(summary)
    }
}
