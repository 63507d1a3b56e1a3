//! Outbound mail transport abstraction.

use async_trait::async_trait;
use thiserror::Error;

use super::message::OutboundMessage;

/// Provider acknowledgement for one accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Message id assigned to the mail.
    pub message_id: String,
    /// Provider response text, if any.
    pub response: Option<String>,
}

/// Raw transport failure. The message text drives retry classification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    /// Provider or network error text.
    pub message: String,
}

impl TransportError {
    /// Wrap an error message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A channel that can hand one message to a mail provider.
///
/// The governor never calls `send` concurrently on the same transport.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Deliver a single message.
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, TransportError>;
}
