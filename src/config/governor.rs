//! Dispatch governor throttling and retry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Limits applied by the dispatch governor.
///
/// Defaults are tuned for a personal mailbox provider: 5 mails per minute,
/// 9 seconds apart, with a 2 minute pause when the provider signals throttling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Global cap on sends per rolling window.
    pub max_per_minute: u32,
    /// Minimum gap between two sends in milliseconds.
    pub min_interval_ms: u64,
    /// Cooldown between two sends to the same recipient; `None` disables it.
    pub recipient_cooldown_ms: Option<u64>,
    /// Cap on sends per domain per window; `None` disables it.
    pub domain_max_per_minute: Option<u32>,
    /// Length of the rolling window in milliseconds.
    pub window_ms: u64,
    /// Extra wait added after the global window resets.
    pub window_buffer_ms: u64,
    /// Extra wait added after a domain window resets.
    pub domain_buffer_ms: u64,
    /// Retries for transient failures.
    pub max_retries: u32,
    /// First transient backoff; doubles per retry.
    pub backoff_base_ms: u64,
    /// Lower bound of transient backoff jitter.
    pub jitter_min_ms: u64,
    /// Upper bound of transient backoff jitter.
    pub jitter_max_ms: u64,
    /// Pause after a provider throttling signal.
    pub rate_limit_backoff_ms: u64,
    /// Lower bound of throttling backoff jitter.
    pub rate_limit_jitter_min_ms: u64,
    /// Upper bound of throttling backoff jitter.
    pub rate_limit_jitter_max_ms: u64,
    /// Capacity of the send queue.
    pub queue_depth: usize,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_per_minute: 5,
            min_interval_ms: 9_000,
            recipient_cooldown_ms: Some(60_000),
            domain_max_per_minute: Some(5),
            window_ms: 60_000,
            window_buffer_ms: 1_000,
            domain_buffer_ms: 200,
            max_retries: 3,
            backoff_base_ms: 3_000,
            jitter_min_ms: 300,
            jitter_max_ms: 1_200,
            rate_limit_backoff_ms: 120_000,
            rate_limit_jitter_min_ms: 1_000,
            rate_limit_jitter_max_ms: 4_000,
            queue_depth: 1_024,
        }
    }
}

impl GovernorConfig {
    /// Validate governor configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_per_minute == 0 {
            return Err("max_per_minute must be greater than 0".into());
        }
        if self.window_ms == 0 {
            return Err("window_ms must be greater than 0".into());
        }
        if self.domain_max_per_minute == Some(0) {
            return Err("domain_max_per_minute must be greater than 0 when set".into());
        }
        if self.queue_depth == 0 {
            return Err("queue_depth must be greater than 0".into());
        }
        if self.jitter_min_ms > self.jitter_max_ms {
            return Err("jitter_min_ms must not exceed jitter_max_ms".into());
        }
        if self.rate_limit_jitter_min_ms > self.rate_limit_jitter_max_ms {
            return Err("rate_limit_jitter_min_ms must not exceed rate_limit_jitter_max_ms".into());
        }
        Ok(())
    }

    /// Rolling window length.
    pub const fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Buffer after a global window reset.
    pub const fn window_buffer(&self) -> Duration {
        Duration::from_millis(self.window_buffer_ms)
    }

    /// Buffer after a domain window reset.
    pub const fn domain_buffer(&self) -> Duration {
        Duration::from_millis(self.domain_buffer_ms)
    }

    /// Minimum gap between sends.
    pub const fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    /// Per-recipient cooldown, if enabled.
    pub fn recipient_cooldown(&self) -> Option<Duration> {
        self.recipient_cooldown_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Base delay of the transient backoff.
    pub const fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Pause after a throttling signal, before jitter.
    pub const fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }

    /// A configuration with every wait and jitter set to zero, keeping caps.
    pub fn without_delays(mut self) -> Self {
        self.min_interval_ms = 0;
        self.recipient_cooldown_ms = None;
        self.window_buffer_ms = 0;
        self.domain_buffer_ms = 0;
        self.backoff_base_ms = 0;
        self.jitter_min_ms = 0;
        self.jitter_max_ms = 0;
        self.rate_limit_backoff_ms = 0;
        self.rate_limit_jitter_min_ms = 0;
        self.rate_limit_jitter_max_ms = 0;
        self
    }
}
