//! Service configuration from the environment.

use std::time::Duration as StdDuration;

use anyhow::{Context, bail};
use chrono::Duration;

use warden_auth::PasswordPolicy;
use warden_infra::TokenSettings;
use warden_infra::tokens::DEFAULT_ISSUER;
use warden_observability::LogFormat;

const DEV_SECRET: &str = "dev-secret";
const DEFAULT_ADMIN_EMAIL: &str = "admin@system.local";

#[derive(Clone)]
pub struct ServiceConfig {
    pub tokens: TokenSettings,
    pub password_policy: PasswordPolicy,
    /// In-memory credential store when absent.
    pub redis_url: Option<String>,
    pub system_admin_email: String,
    /// Generated on first start when absent.
    pub system_admin_password: Option<String>,
    pub request_timeout: StdDuration,
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            tokens: TokenSettings::new(DEV_SECRET),
            password_policy: PasswordPolicy::default(),
            redis_url: None,
            system_admin_email: DEFAULT_ADMIN_EMAIL.to_string(),
            system_admin_password: None,
            request_timeout: StdDuration::from_secs(30),
            log_format: LogFormat::default(),
        }
    }
}

impl core::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("tokens", &self.tokens)
            .field("password_policy", &self.password_policy)
            .field("redis_url", &self.redis_url)
            .field("system_admin_email", &self.system_admin_email)
            .field("system_admin_password", &self.system_admin_password.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl ServiceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let secret = get("WARDEN_JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("WARDEN_JWT_SECRET not set; using insecure dev default");
            DEV_SECRET.to_string()
        });
        let mut tokens = TokenSettings::new(secret);
        tokens.issuer = get("WARDEN_JWT_ISSUER").unwrap_or_else(|| DEFAULT_ISSUER.to_string());
        if let Some(raw) = get("WARDEN_ACCESS_TOKEN_TTL") {
            tokens.access_ttl = parse_duration(&raw).context("WARDEN_ACCESS_TOKEN_TTL")?;
        }
        if let Some(raw) = get("WARDEN_REFRESH_TOKEN_TTL") {
            tokens.refresh_ttl = parse_duration(&raw).context("WARDEN_REFRESH_TOKEN_TTL")?;
        }
        if let Some(raw) = get("WARDEN_REVOKE_ALL_ON_REFRESH_REUSE") {
            tokens.revoke_all_on_refresh_reuse =
                parse_bool(&raw).context("WARDEN_REVOKE_ALL_ON_REFRESH_REUSE")?;
        }
        if let Some(raw) = get("WARDEN_EXPIRED_REFRESH_RETENTION") {
            tokens.expired_refresh_retention =
                parse_duration(&raw).context("WARDEN_EXPIRED_REFRESH_RETENTION")?;
        }
        if tokens.refresh_ttl < tokens.access_ttl {
            bail!("refresh token TTL must not be shorter than the access token TTL");
        }

        let mut config = Self {
            tokens,
            redis_url: get("WARDEN_REDIS_URL"),
            system_admin_password: get("WARDEN_SYSTEM_ADMIN_PASSWORD"),
            ..Self::default()
        };
        if let Some(email) = get("WARDEN_SYSTEM_ADMIN_EMAIL") {
            config.system_admin_email = email;
        }
        if let Some(raw) = get("WARDEN_REQUEST_TIMEOUT") {
            config.request_timeout = parse_duration(&raw)
                .context("WARDEN_REQUEST_TIMEOUT")?
                .to_std()
                .context("WARDEN_REQUEST_TIMEOUT")?;
        }
        config.log_format = log_format_from_lookup(&lookup)?;
        Ok(config)
    }
}

/// Only `WARDEN_LOG_FORMAT`, so logging can start before the rest is read.
pub fn log_format_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<LogFormat> {
    match lookup("WARDEN_LOG_FORMAT").map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(raw) => raw.parse().context("WARDEN_LOG_FORMAT"),
        None => Ok(LogFormat::default()),
    }
}

/// Accepts plain seconds or a number with one of the suffixes `s`, `m`, `h`, `d`.
pub fn parse_duration(raw: &str) -> anyhow::Result<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&raw[..i], c.to_ascii_lowercase()),
        _ => (raw, 's'),
    };
    let value: i64 = digits
        .parse()
        .with_context(|| format!("invalid duration '{raw}'"))?;
    if value <= 0 {
        bail!("duration '{raw}' must be positive");
    }
    let duration = match unit {
        's' => Duration::try_seconds(value),
        'm' => Duration::try_minutes(value),
        'h' => Duration::try_hours(value),
        'd' => Duration::try_days(value),
        other => bail!("unknown duration unit '{other}' in '{raw}'"),
    };
    duration.with_context(|| format!("duration '{raw}' is out of range"))
}

fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got '{other}'"),
    }
}
