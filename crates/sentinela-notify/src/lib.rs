//! Notification delivery for alert lifecycles.
//!
//! A monitor's notification specs expand into reactions on the alert
//! lifecycle events at load time: the reactions maintain Notification
//! rows in the store (one active per alert and channel class) and drive
//! a [`NotificationChannel`] implementation against the opaque target
//! it allocated. Specific back-ends beyond the generic webhook live in
//! plugins and register through the [`plugin::ChannelRegistry`].

pub mod channels;
pub mod manager;
pub mod plugin;

#[cfg(test)]
mod tests;

pub use manager::NotificationManager;
pub use plugin::ChannelRegistry;

use anyhow::Result;
use async_trait::async_trait;
use sentinela_common::types::Priority;

/// Content handed to a channel when opening, refreshing, or closing a
/// notification message.
#[derive(Debug, Clone)]
pub struct NotificationContent {
    pub monitor_id: i64,
    pub monitor_name: String,
    pub alert_id: i64,
    pub priority: Option<Priority>,
    pub event_name: String,
    /// Snapshot of the alert row that triggered the event.
    pub alert_data: serde_json::Value,
    pub mentions: Vec<String>,
    /// Channel-specific parameters from the notification spec.
    pub params: serde_json::Value,
}

/// A notification back-end tied to one channel class.
///
/// `open` allocates an outbound message and returns the opaque target
/// (channel + message id) persisted with the Notification row; `update`
/// and `close` address that target.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel class name (e.g. `"webhook"`).
    fn channel_type(&self) -> &str;

    /// Deliver a new notification, returning its target.
    async fn open(&self, content: &NotificationContent) -> Result<String>;

    /// Refresh an already delivered notification.
    async fn update(&self, target: &str, content: &NotificationContent) -> Result<()>;

    /// Finalize the notification on the channel.
    async fn close(&self, target: &str, content: &NotificationContent) -> Result<()>;
}
