use crate::manager::NotificationManager;
use crate::plugin::ChannelRegistry;
use crate::{NotificationChannel, NotificationContent};
use anyhow::Result;
use async_trait::async_trait;
use sentinela_common::types::{EventPayload, NotificationStatus, Priority};
use sentinela_registry::NotificationSpec;
use sentinela_storage::{NoReactions, Store, StoreSettings};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Default)]
struct RecordingChannel {
    calls: Mutex<Vec<String>>,
}

impl RecordingChannel {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn channel_type(&self) -> &str {
        "recording"
    }

    async fn open(&self, content: &NotificationContent) -> Result<String> {
        self.record(format!("open:{}:{}", content.alert_id, content.event_name));
        Ok(format!("recording:{}", content.alert_id))
    }

    async fn update(&self, target: &str, content: &NotificationContent) -> Result<()> {
        self.record(format!("update:{target}:{}", content.event_name));
        Ok(())
    }

    async fn close(&self, target: &str, content: &NotificationContent) -> Result<()> {
        self.record(format!("close:{target}:{}", content.event_name));
        Ok(())
    }
}

async fn setup() -> (TempDir, Arc<Store>, Arc<NotificationManager>, Arc<RecordingChannel>) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
    let store = Arc::new(
        Store::connect(&url, StoreSettings::default(), Arc::new(NoReactions), false)
            .await
            .unwrap(),
    );

    let channel = Arc::new(RecordingChannel::default());
    let mut registry = ChannelRegistry::new();
    registry.register(channel.clone());

    let manager = Arc::new(NotificationManager::new(store.clone(), registry));
    (dir, store, manager, channel)
}

fn spec(min_priority: Priority) -> NotificationSpec {
    let mut spec = NotificationSpec::new("recording");
    spec.min_priority_to_send = min_priority;
    spec.mentions = vec!["@oncall".to_string()];
    spec
}

fn alert_event(monitor_id: i64, alert_id: i64, event_name: &str, priority: &str) -> EventPayload {
    EventPayload {
        event_source: "alert".to_string(),
        event_source_id: alert_id,
        event_source_monitor_id: monitor_id,
        event_name: event_name.to_string(),
        event_data: json!({
            "id": alert_id,
            "monitor_id": monitor_id,
            "status": "active",
            "priority": priority,
        }),
        extra_payload: None,
    }
}

async fn run_reactions(
    manager: &Arc<NotificationManager>,
    spec: &NotificationSpec,
    payload: EventPayload,
) {
    let reactions = manager.reactions_for(spec);
    let event_name = payload.event_name.clone();
    for reaction in reactions.get(&event_name) {
        reaction(payload.clone()).await.unwrap();
    }
}

#[tokio::test]
async fn alert_created_opens_a_notification() {
    let (_dir, store, manager, channel) = setup().await;
    let monitor = store
        .register_monitor("notify_open", "catalog://t", "v1")
        .await
        .unwrap();

    let spec = spec(Priority::Informational);
    run_reactions(&manager, &spec, alert_event(monitor.id, 1, "alert_created", "low")).await;

    assert_eq!(channel.calls(), vec!["open:1:alert_created"]);
    let notification = store.active_notification(1, "recording").await.unwrap().unwrap();
    assert_eq!(notification.target, "recording:1");
    assert_eq!(notification.status, NotificationStatus::Active);
}

#[tokio::test]
async fn below_min_priority_is_suppressed_until_promotion() {
    let (_dir, store, manager, channel) = setup().await;
    let monitor = store
        .register_monitor("notify_gate", "catalog://t", "v1")
        .await
        .unwrap();

    // Only moderate or higher may open the notification.
    let spec = spec(Priority::Moderate);
    run_reactions(&manager, &spec, alert_event(monitor.id, 2, "alert_created", "low")).await;
    assert!(channel.calls().is_empty());
    assert!(store.active_notification(2, "recording").await.unwrap().is_none());

    // Promotion past the threshold opens it.
    run_reactions(
        &manager,
        &spec,
        alert_event(monitor.id, 2, "alert_priority_increased", "high"),
    )
    .await;
    assert_eq!(channel.calls(), vec!["open:2:alert_priority_increased"]);
    assert!(store.active_notification(2, "recording").await.unwrap().is_some());
}

#[tokio::test]
async fn open_notifications_are_updated_not_reopened() {
    let (_dir, store, manager, channel) = setup().await;
    let monitor = store
        .register_monitor("notify_update", "catalog://t", "v1")
        .await
        .unwrap();

    let spec = spec(Priority::Informational);
    run_reactions(&manager, &spec, alert_event(monitor.id, 3, "alert_created", "low")).await;
    run_reactions(&manager, &spec, alert_event(monitor.id, 3, "alert_updated", "low")).await;

    assert_eq!(
        channel.calls(),
        vec!["open:3:alert_created", "update:recording:3:alert_updated"]
    );

    let notification = store.active_notification(3, "recording").await.unwrap().unwrap();
    // Still a single active row for (alert, channel).
    let (dup, created) = store
        .create_notification(
            monitor.id,
            3,
            "recording",
            "recording:3",
            Priority::Informational,
            None,
        )
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(dup.id, notification.id);
}

#[tokio::test]
async fn alert_solved_closes_the_notification() {
    let (_dir, store, manager, channel) = setup().await;
    let monitor = store
        .register_monitor("notify_close", "catalog://t", "v1")
        .await
        .unwrap();

    let spec = spec(Priority::Informational);
    run_reactions(&manager, &spec, alert_event(monitor.id, 4, "alert_created", "low")).await;
    run_reactions(&manager, &spec, alert_event(monitor.id, 4, "alert_solved", "low")).await;

    assert_eq!(
        channel.calls(),
        vec!["open:4:alert_created", "close:recording:4:alert_solved"]
    );
    assert!(store.active_notification(4, "recording").await.unwrap().is_none());

    // Solving again is a no-op.
    run_reactions(&manager, &spec, alert_event(monitor.id, 4, "alert_solved", "low")).await;
    assert_eq!(channel.calls().len(), 2);
}

#[tokio::test]
async fn unknown_channel_surfaces_an_error() {
    let (_dir, store, manager, _channel) = setup().await;
    let monitor = store
        .register_monitor("notify_unknown", "catalog://t", "v1")
        .await
        .unwrap();

    let mut bad_spec = NotificationSpec::new("missing_channel");
    bad_spec.min_priority_to_send = Priority::Informational;

    let reactions = manager.reactions_for(&bad_spec);
    let payload = alert_event(monitor.id, 5, "alert_created", "low");
    let result = reactions.get("alert_created")[0](payload).await;
    assert!(result.is_err());
}
