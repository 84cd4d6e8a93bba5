use crate::{ChannelRegistry, NotificationContent};
use anyhow::Result;
use sentinela_common::events;
use sentinela_common::types::{EventPayload, Priority};
use sentinela_registry::{NotificationSpec, ReactionOptions};
use sentinela_storage::Store;
use std::sync::Arc;

/// Alert lifecycle events that keep an open notification fresh.
const REFRESH_EVENTS: &[&str] = &[
    events::ALERT_CREATED,
    events::ALERT_UPDATED,
    events::ALERT_PRIORITY_INCREASED,
    events::ALERT_PRIORITY_DECREASED,
    events::ALERT_ACKNOWLEDGED,
    events::ALERT_ACKNOWLEDGE_DISMISSED,
];

/// Expands notification specs into alert lifecycle reactions and runs
/// the channel calls they imply, maintaining the Notification rows.
pub struct NotificationManager {
    store: Arc<Store>,
    channels: ChannelRegistry,
}

impl NotificationManager {
    pub fn new(store: Arc<Store>, channels: ChannelRegistry) -> Self {
        Self { store, channels }
    }

    /// Build the reactions a notification spec contributes to its
    /// monitor. The loader merges these into the monitor's reactions.
    pub fn reactions_for(self: &Arc<Self>, spec: &NotificationSpec) -> ReactionOptions {
        let mut reactions = ReactionOptions::new();

        for event_name in REFRESH_EVENTS {
            let manager = self.clone();
            let spec = spec.clone();
            reactions.push(
                event_name,
                Arc::new(move |payload: EventPayload| {
                    let manager = manager.clone();
                    let spec = spec.clone();
                    Box::pin(async move { manager.handle_alert_event(&spec, payload).await })
                }),
            );
        }

        let manager = self.clone();
        let spec = spec.clone();
        reactions.push(
            events::ALERT_SOLVED,
            Arc::new(move |payload: EventPayload| {
                let manager = manager.clone();
                let spec = spec.clone();
                Box::pin(async move { manager.handle_alert_solved(&spec, payload).await })
            }),
        );

        reactions
    }

    async fn content(
        &self,
        spec: &NotificationSpec,
        payload: &EventPayload,
    ) -> Result<NotificationContent> {
        let monitor_id = payload.event_source_monitor_id;
        let monitor_name = self
            .store
            .get_monitor(monitor_id)
            .await?
            .map(|monitor| monitor.name)
            .unwrap_or_else(|| format!("monitor_{monitor_id}"));

        Ok(NotificationContent {
            monitor_id,
            monitor_name,
            alert_id: payload.event_source_id,
            priority: alert_priority(payload),
            event_name: payload.event_name.clone(),
            alert_data: payload.event_data.clone(),
            mentions: spec.mentions.clone(),
            params: spec.params.clone(),
        })
    }

    /// Open or refresh the notification for an active alert.
    async fn handle_alert_event(
        &self,
        spec: &NotificationSpec,
        payload: EventPayload,
    ) -> Result<()> {
        let Some(channel) = self.channels.get(&spec.channel) else {
            anyhow::bail!("notification channel '{}' is not registered", spec.channel);
        };
        let content = self.content(spec, &payload).await?;
        let alert_id = content.alert_id;

        let existing = self.store.active_notification(alert_id, &spec.channel).await?;

        if let Some(notification) = existing {
            channel.update(&notification.target, &content).await?;
            tracing::debug!(
                alert_id,
                channel = %spec.channel,
                event = %payload.event_name,
                "Notification updated"
            );
            return Ok(());
        }

        // No open notification yet: only the qualifying priorities
        // create one.
        let qualifies = content
            .priority
            .is_some_and(|priority| priority.level() <= spec.min_priority_to_send.level());
        if !qualifies {
            tracing::debug!(
                alert_id,
                channel = %spec.channel,
                priority = ?content.priority,
                "Notification suppressed below min priority"
            );
            return Ok(());
        }

        let target = channel.open(&content).await?;
        let (notification, created) = self
            .store
            .create_notification(
                content.monitor_id,
                alert_id,
                &spec.channel,
                &target,
                spec.min_priority_to_send,
                None,
            )
            .await?;
        if created {
            tracing::info!(
                alert_id,
                notification_id = notification.id,
                channel = %spec.channel,
                "Notification opened"
            );
        } else if notification.target != target {
            // Lost a race with a concurrent open; keep the stored row
            // as truth for future updates.
            self.store
                .update_notification_target(notification.id, &target, None)
                .await?;
        }
        Ok(())
    }

    /// Close out the notification when the alert solves.
    async fn handle_alert_solved(
        &self,
        spec: &NotificationSpec,
        payload: EventPayload,
    ) -> Result<()> {
        let Some(channel) = self.channels.get(&spec.channel) else {
            anyhow::bail!("notification channel '{}' is not registered", spec.channel);
        };
        let content = self.content(spec, &payload).await?;

        let Some(notification) = self
            .store
            .active_notification(content.alert_id, &spec.channel)
            .await?
        else {
            return Ok(());
        };

        channel.close(&notification.target, &content).await?;
        self.store.close_notification(notification.id).await?;
        tracing::info!(
            alert_id = content.alert_id,
            notification_id = notification.id,
            channel = %spec.channel,
            "Notification closed"
        );
        Ok(())
    }
}

fn alert_priority(payload: &EventPayload) -> Option<Priority> {
    payload
        .event_data
        .get("priority")
        .and_then(|value| value.as_str())
        .and_then(|name| name.parse::<Priority>().ok())
}
