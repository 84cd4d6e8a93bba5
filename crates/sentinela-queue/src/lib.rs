//! Work-queue transport for the engine.
//!
//! Messages carry a kind (`monitor`, `event`, `request`) and a JSON
//! payload. A received message stays invisible for its visibility
//! window; without an ack before the window expires it becomes
//! redeliverable, so handlers must be idempotent. Ordering is
//! best-effort FIFO.
//!
//! Two implementations satisfy the contract: [`internal::InternalQueue`]
//! for single-process deployments and [`broker::BrokerQueue`] for an
//! external SQS-shaped broker.

pub mod broker;
pub mod internal;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Monitor,
    Event,
    Request,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Monitor => write!(f, "monitor"),
            MessageKind::Event => write!(f, "event"),
            MessageKind::Request => write!(f, "request"),
        }
    }
}

/// Wire form of a queued message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: MessageKind,
    pub payload: serde_json::Value,
}

/// A received message plus the receipt handle that scopes
/// ack/nack/extend operations to this delivery.
#[derive(Debug, Clone)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: serde_json::Value,
    pub receipt: String,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("queue transport error: {0}")]
    Transport(String),

    #[error("malformed message body: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue a message.
    async fn send(&self, kind: MessageKind, payload: serde_json::Value) -> Result<(), QueueError>;

    /// Wait up to `wait` for a message. `None` when the queue stayed
    /// empty for the whole window.
    async fn receive(&self, wait: Duration) -> Result<Option<Message>, QueueError>;

    /// Push the message's visibility deadline `window` into the future.
    async fn extend_visibility(
        &self,
        message: &Message,
        window: Duration,
    ) -> Result<(), QueueError>;

    /// Delete the message; it will not be redelivered.
    async fn ack(&self, message: &Message) -> Result<(), QueueError>;

    /// Return the message immediately for redelivery.
    async fn nack(&self, message: &Message) -> Result<(), QueueError>;
}
