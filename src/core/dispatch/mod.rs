//! Serialized, throttled outbound mail dispatch.
//!
//! A [`DispatchGovernor`] owns one transport and one bounded FIFO queue consumed
//! by a single worker task, so exactly one send is in flight at any time and
//! rate-limit bookkeeping needs no locks. Producers clone the governor (it is a
//! queue handle) and either await the outcome or drop the returned
//! [`SendHandle`].
//!
//! # Example
//!
//! ```rust,ignore
//! use skill_registry::config::GovernorConfig;
//! use skill_registry::core::dispatch::{DispatchGovernor, SendRequest, SenderIdentity};
//! use skill_registry::runtime::TokioSpawner;
//!
//! let governor = DispatchGovernor::start(
//!     GovernorConfig::default(),
//!     SenderIdentity::default(),
//!     transport,
//!     &TokioSpawner::current(),
//! );
//! let delivery = governor.send(SendRequest::text("ada@example.com", "Hi", "Hello")).await?;
//! ```

pub mod classify;
pub mod message;
pub mod throttle;
pub mod transport;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Instant};

use crate::config::GovernorConfig;
use crate::core::{DispatchError, Spawn};

pub use classify::{classify, ErrorClass};
pub use message::{enrich, html_to_text, OutboundMessage, SendRequest, SenderIdentity};
pub use throttle::GovernorState;
pub use transport::{SendReceipt, Transport, TransportError};

/// Successful delivery of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Provider acknowledgement.
    pub receipt: SendReceipt,
    /// Attempts that reached the transport, including the successful one.
    pub attempts: u32,
}

/// Statistics about governor throughput.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Requests waiting in the queue.
    pub queued: u64,
    /// Requests delivered.
    pub delivered: u64,
    /// Requests that ended in a terminal failure.
    pub failed: u64,
    /// Retries after a failed attempt.
    pub retries: u64,
    /// Attempts that reached the transport.
    pub attempts: u64,
}

#[derive(Debug, Default)]
struct DispatchCounters {
    queued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
    attempts: AtomicU64,
}

impl DispatchCounters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            queued: self.queued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
        }
    }
}

/// Terminal result of one queued request.
pub type SendOutcome = Result<Delivery, DispatchError>;

struct Job {
    request: SendRequest,
    reply: oneshot::Sender<SendOutcome>,
}

/// Pending outcome of a queued request. Dropping it does not cancel the send.
#[derive(Debug)]
pub struct SendHandle {
    rx: oneshot::Receiver<SendOutcome>,
}

impl SendHandle {
    /// Wait for the terminal outcome.
    pub async fn outcome(self) -> SendOutcome {
        self.rx.await.unwrap_or(Err(DispatchError::QueueClosed))
    }
}

/// Handle to the process-wide dispatch pipeline.
#[derive(Clone)]
pub struct DispatchGovernor {
    tx: Option<mpsc::Sender<Job>>,
    transport_name: Option<String>,
    counters: Arc<DispatchCounters>,
}

impl std::fmt::Debug for DispatchGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchGovernor")
            .field("transport", &self.transport_name)
            .field("stats", &self.counters.snapshot())
            .finish()
    }
}

impl DispatchGovernor {
    /// Start the worker on `spawner` and return a handle to its queue.
    pub fn start<S: Spawn>(
        config: GovernorConfig,
        sender: SenderIdentity,
        transport: Arc<dyn Transport>,
        spawner: &S,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let counters = Arc::new(DispatchCounters::default());
        let transport_name = transport.name().to_string();
        let worker = Worker {
            rx,
            transport,
            state: GovernorState::new(Instant::now()),
            config,
            sender,
            counters: Arc::clone(&counters),
        };
        spawner.spawn(worker.run());
        Self {
            tx: Some(tx),
            transport_name: Some(transport_name),
            counters,
        }
    }

    /// A governor with no transport. Every request fails with
    /// [`DispatchError::TransportDisabled`] and nothing is sent.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            transport_name: None,
            counters: Arc::new(DispatchCounters::default()),
        }
    }

    /// Whether a transport is configured.
    pub const fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Name of the selected transport.
    pub fn transport_name(&self) -> Option<&str> {
        self.transport_name.as_deref()
    }

    /// Queue a request and wait for its terminal outcome. Waits for queue room.
    pub async fn send(&self, request: SendRequest) -> SendOutcome {
        let tx = self.tx.as_ref().ok_or(DispatchError::TransportDisabled)?;
        // Count only once a slot is held; a caller dropped while waiting leaves no trace.
        let permit = tx.reserve().await.map_err(|_| DispatchError::QueueClosed)?;
        let (reply, rx) = oneshot::channel();
        self.counters.queued.fetch_add(1, Ordering::Relaxed);
        permit.send(Job { request, reply });
        SendHandle { rx }.outcome().await
    }

    /// Queue a request without waiting. Fails fast when the queue is full.
    pub fn dispatch(&self, request: SendRequest) -> Result<SendHandle, DispatchError> {
        let tx = self.tx.as_ref().ok_or(DispatchError::TransportDisabled)?;
        let (reply, rx) = oneshot::channel();
        self.counters.queued.fetch_add(1, Ordering::Relaxed);
        match tx.try_send(Job { request, reply }) {
            Ok(()) => Ok(SendHandle { rx }),
            Err(e) => {
                self.counters.queued.fetch_sub(1, Ordering::Relaxed);
                Err(match e {
                    mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
                    mpsc::error::TrySendError::Closed(_) => DispatchError::QueueClosed,
                })
            }
        }
    }

    /// Current counters.
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }
}

/// The single consumer of the send queue. Owns all rate-limit state.
struct Worker {
    rx: mpsc::Receiver<Job>,
    transport: Arc<dyn Transport>,
    state: GovernorState,
    config: GovernorConfig,
    sender: SenderIdentity,
    counters: Arc<DispatchCounters>,
}

impl Worker {
    async fn run(mut self) {
        tracing::info!("dispatch worker started on {}", self.transport.name());
        while let Some(job) = self.rx.recv().await {
            self.counters.queued.fetch_sub(1, Ordering::Relaxed);
            let to = job.request.to.clone();
            let outcome = self.process(job.request).await;
            match &outcome {
                Ok(delivery) => {
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(
                        "mail to {} sent: {} ({}/{} this window)",
                        to,
                        delivery.receipt.message_id,
                        self.state.window_count(),
                        self.config.max_per_minute
                    );
                }
                Err(e) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!("mail to {} failed: {}", to, e);
                }
            }
            if job.reply.send(outcome).is_err() {
                tracing::debug!("caller stopped waiting for mail to {}", to);
            }
        }
        tracing::info!("dispatch worker stopped");
    }

    async fn process(&mut self, request: SendRequest) -> SendOutcome {
        if message::recipient_domain(&request.to).is_none() {
            return Err(DispatchError::InvalidMessage(format!(
                "invalid recipient {:?}",
                request.to
            )));
        }
        let recipient = message::bare_address(&request.to).to_lowercase();
        self.state.throttle(&self.config, &recipient).await;
        let message = enrich(request, &self.sender);
        self.deliver(&message, &recipient).await
    }

    /// Pending → Sending → Success | RetryWait | Failed.
    async fn deliver(&mut self, message: &OutboundMessage, recipient: &str) -> SendOutcome {
        let mut attempts = 0u32;
        let mut transient_retries = 0u32;
        let mut rate_limited = false;
        loop {
            attempts += 1;
            self.counters.attempts.fetch_add(1, Ordering::Relaxed);
            let result = self.transport.send(message).await;
            self.state
                .record_attempt(&self.config, recipient, Instant::now());

            let err = match result {
                Ok(receipt) => return Ok(Delivery { receipt, attempts }),
                Err(err) => err,
            };

            match classify(&err.message) {
                ErrorClass::RateLimit if !rate_limited => {
                    rate_limited = true;
                    let wait = self.config.rate_limit_backoff()
                        + jitter(
                            self.config.rate_limit_jitter_min_ms,
                            self.config.rate_limit_jitter_max_ms,
                        );
                    tracing::warn!(
                        "provider rate limit for {}: {}; waiting {}s before retry",
                        recipient,
                        err,
                        wait.as_secs_f32().ceil()
                    );
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    sleep(wait).await;
                    self.state.reset_window(Instant::now());
                }
                ErrorClass::RateLimit => {
                    return Err(DispatchError::RateLimited {
                        attempts,
                        message: err.message,
                    });
                }
                ErrorClass::Transient if transient_retries < self.config.max_retries => {
                    transient_retries += 1;
                    let wait = backoff(self.config.backoff_base(), transient_retries)
                        + jitter(self.config.jitter_min_ms, self.config.jitter_max_ms);
                    tracing::warn!(
                        "transient error for {}: {}; retry {}/{} in {}ms",
                        recipient,
                        err,
                        transient_retries,
                        self.config.max_retries,
                        wait.as_millis()
                    );
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    sleep(wait).await;
                }
                ErrorClass::Transient => {
                    return Err(DispatchError::TransientSendFailure {
                        attempts,
                        message: err.message,
                    });
                }
                ErrorClass::Permanent => {
                    return Err(DispatchError::PermanentSendFailure(err.message));
                }
            }
        }
    }
}

/// `base * 2^(retry - 1)`.
fn backoff(base: Duration, retry: u32) -> Duration {
    base.saturating_mul(1u32 << retry.saturating_sub(1).min(16))
}

fn jitter(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
}
