//! Governor bookkeeping and the layered throttles applied before each send.
//!
//! Throttles run in a fixed order: global window cap, minimum interval,
//! per-recipient cooldown, per-domain cap. Each may sleep. Every attempt that
//! reached the transport is recorded, whether it succeeded or not.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use super::message::{bare_address, recipient_domain};
use crate::config::GovernorConfig;

#[derive(Debug, Clone, Copy)]
struct DomainWindow {
    count: u32,
    reset_at: Instant,
}

/// Rate-limit state owned by the dispatch worker.
#[derive(Debug)]
pub struct GovernorState {
    last_send: Option<Instant>,
    window_start: Instant,
    window_count: u32,
    recipients: HashMap<String, Instant>,
    domains: HashMap<String, DomainWindow>,
}

impl Default for GovernorState {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl GovernorState {
    /// Fresh state with the window starting at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            last_send: None,
            window_start: now,
            window_count: 0,
            recipients: HashMap::new(),
            domains: HashMap::new(),
        }
    }

    /// Sends counted in the current window.
    pub const fn window_count(&self) -> u32 {
        self.window_count
    }

    /// Apply every throttle in order, sleeping as required.
    pub async fn throttle(&mut self, cfg: &GovernorConfig, recipient: &str) {
        if let Some(wait) = self.global_window_wait(cfg, Instant::now()) {
            tracing::warn!(
                "per-minute cap of {} reached, waiting {}s",
                cfg.max_per_minute,
                wait.as_secs_f32().ceil()
            );
            sleep(wait).await;
            self.reset_window(Instant::now());
        }

        if let Some(wait) = self.interval_wait(cfg, Instant::now()) {
            tracing::debug!("spacing sends, waiting {}ms", wait.as_millis());
            sleep(wait).await;
        }

        if let Some(wait) = self.recipient_wait(cfg, recipient, Instant::now()) {
            tracing::info!(
                "throttling {}, waiting {}s before resend",
                recipient,
                wait.as_secs_f32().ceil()
            );
            sleep(wait).await;
        }

        if let Some(domain) = recipient_domain(recipient) {
            if let Some(wait) = self.domain_wait(cfg, &domain, Instant::now()) {
                tracing::warn!(
                    "per-domain cap reached for {}, waiting {}s",
                    domain,
                    wait.as_secs_f32().ceil()
                );
                sleep(wait).await;
                self.reset_domain(cfg, &domain, Instant::now());
            }
        }
    }

    /// Wait imposed by the global cap. Rolls the window over when it expired.
    pub fn global_window_wait(&mut self, cfg: &GovernorConfig, now: Instant) -> Option<Duration> {
        let window = cfg.window();
        if now.saturating_duration_since(self.window_start) >= window {
            self.reset_window(now);
        }
        (self.window_count >= cfg.max_per_minute).then(|| {
            (self.window_start + window).saturating_duration_since(now) + cfg.window_buffer()
        })
    }

    /// Wait imposed by the minimum gap since the last attempt.
    pub fn interval_wait(&self, cfg: &GovernorConfig, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.last_send?);
        let min = cfg.min_interval();
        (elapsed < min).then(|| min - elapsed)
    }

    /// Remaining cooldown for this recipient.
    pub fn recipient_wait(
        &self,
        cfg: &GovernorConfig,
        recipient: &str,
        now: Instant,
    ) -> Option<Duration> {
        let cooldown = cfg.recipient_cooldown()?;
        let last = self.recipients.get(&recipient_key(recipient))?;
        let elapsed = now.saturating_duration_since(*last);
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }

    /// Wait imposed by the domain cap. Rolls the domain window over when it expired.
    pub fn domain_wait(
        &mut self,
        cfg: &GovernorConfig,
        domain: &str,
        now: Instant,
    ) -> Option<Duration> {
        let max = cfg.domain_max_per_minute?;
        let window = cfg.window();
        let record = self.domains.entry(domain.to_string()).or_insert(DomainWindow {
            count: 0,
            reset_at: now + window,
        });
        if now >= record.reset_at {
            record.count = 0;
            record.reset_at = now + window;
        }
        (record.count >= max)
            .then(|| record.reset_at.saturating_duration_since(now) + cfg.domain_buffer())
    }

    /// Count one transport attempt against every limit.
    pub fn record_attempt(&mut self, cfg: &GovernorConfig, recipient: &str, now: Instant) {
        self.last_send = Some(now);
        self.window_count += 1;

        if let Some(cooldown) = cfg.recipient_cooldown() {
            self.recipients
                .retain(|_, at| now.saturating_duration_since(*at) < cooldown);
            self.recipients.insert(recipient_key(recipient), now);
        }

        if cfg.domain_max_per_minute.is_some() {
            if let Some(domain) = recipient_domain(recipient) {
                let window = cfg.window();
                self.domains.retain(|_, w| w.reset_at > now);
                let record = self.domains.entry(domain).or_insert(DomainWindow {
                    count: 0,
                    reset_at: now + window,
                });
                record.count += 1;
            }
        }
    }

    /// Start a new global window at `now`.
    pub fn reset_window(&mut self, now: Instant) {
        self.window_count = 0;
        self.window_start = now;
    }

    fn reset_domain(&mut self, cfg: &GovernorConfig, domain: &str, now: Instant) {
        self.domains.insert(
            domain.to_string(),
            DomainWindow {
                count: 0,
                reset_at: now + cfg.window(),
            },
        );
    }
}

fn recipient_key(recipient: &str) -> String {
    bare_address(recipient).to_lowercase()
}
