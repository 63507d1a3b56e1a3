//! Root registry configuration and environment loading.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::governor::GovernorConfig;
use super::transport::{Credentials, TransportConfig};

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Dispatch governor limits.
    pub governor: GovernorConfig,
    /// Mail transport.
    pub transport: TransportConfig,
    /// One-time code lifetime in seconds.
    pub otp_ttl_secs: u64,
    /// Capacity given to seeded skills.
    pub default_max_selection: u32,
    /// Link placed in re-registration notices.
    pub registration_url: String,
    /// Postgres connection string.
    pub database_url: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            governor: GovernorConfig::default(),
            transport: TransportConfig::default(),
            otp_ttl_secs: 600,
            default_max_selection: 160,
            registration_url: "http://localhost:3000".into(),
            database_url: None,
        }
    }
}

impl RegistryConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.governor
            .validate()
            .map_err(|e| format!("governor invalid: {e}"))?;
        self.transport
            .validate()
            .map_err(|e| format!("transport invalid: {e}"))?;
        if self.otp_ttl_secs == 0 {
            return Err("otp_ttl_secs must be greater than 0".into());
        }
        if self.default_max_selection == 0 {
            return Err("default_max_selection must be greater than 0".into());
        }
        Ok(())
    }

    /// One-time code lifetime.
    pub const fn otp_ttl(&self) -> Duration {
        Duration::from_secs(self.otp_ttl_secs)
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, String> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!("failed to read .env: {}", e);
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = Self::default();

        let t = &mut cfg.transport;
        t.provider = var("SMTP_PROVIDER");
        t.relay = Credentials::pair(var("ZOHO_USER"), var("ZOHO_PASS"));
        t.mailbox = Credentials::pair(var("GMAIL_USER"), var("GMAIL_PASS"));
        if let Some(host) = var("RELAY_SMTP_HOST") {
            t.relay_host = host;
        }
        if let Some(name) = var("EMAIL_SENDER_NAME").or_else(|| var("GMAIL_SENDER_NAME")) {
            t.sender_name = name;
        }
        t.sender_address = var("EMAIL_SENDER");
        t.unsubscribe_url = var("UNSUBSCRIBE_URL");
        t.unsubscribe_email = var("UNSUBSCRIBE_EMAIL");
        t.timeout_secs = parse_or(&var, "SMTP_TIMEOUT_SECS", t.timeout_secs)?;

        let g = &mut cfg.governor;
        g.max_per_minute = parse_or(&var, "MAIL_MAX_PER_MINUTE", g.max_per_minute)?;
        g.min_interval_ms = parse_or(&var, "MAIL_MIN_INTERVAL_MS", g.min_interval_ms)?;
        g.recipient_cooldown_ms =
            parse_opt(&var, "MAIL_RECIPIENT_COOLDOWN_MS", g.recipient_cooldown_ms)?;
        g.domain_max_per_minute =
            parse_opt(&var, "MAIL_DOMAIN_MAX_PER_MINUTE", g.domain_max_per_minute)?;
        g.max_retries = parse_or(&var, "MAIL_MAX_RETRIES", g.max_retries)?;
        g.backoff_base_ms = parse_or(&var, "MAIL_BACKOFF_BASE_MS", g.backoff_base_ms)?;
        g.rate_limit_backoff_ms =
            parse_or(&var, "MAIL_RATE_LIMIT_BACKOFF_MS", g.rate_limit_backoff_ms)?;
        g.queue_depth = parse_or(&var, "MAIL_QUEUE_DEPTH", g.queue_depth)?;

        cfg.otp_ttl_secs = parse_or(&var, "OTP_TTL_SECS", cfg.otp_ttl_secs)?;
        cfg.default_max_selection =
            parse_or(&var, "DEFAULT_MAX_SELECTION", cfg.default_max_selection)?;
        if let Some(url) = var("REGISTRATION_URL") {
            cfg.registration_url = url;
        }
        cfg.database_url = var("DATABASE_URL");

        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    var(key).map_or(Ok(default), |raw| {
        raw.parse()
            .map_err(|e| format!("invalid {key} value `{raw}`: {e}"))
    })
}

/// Like [`parse_or`], but `off`, `none` or `0` disable the layer.
fn parse_opt<T, F>(var: &F, key: &str, default: Option<T>) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key).as_deref() {
        None => Ok(default),
        Some("off" | "none" | "0") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| format!("invalid {key} value `{raw}`: {e}")),
    }
}
