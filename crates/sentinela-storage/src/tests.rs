use crate::store::{NoReactions, ReactionLookup, Store, StoreSettings};
use chrono::{Duration, Utc};
use sentinela_alert::{AlertRule, CountRule, PriorityLevels};
use sentinela_common::types::{AlertStatus, IssueStatus, NotificationStatus, Priority, RunKind, RunOutcome};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

struct AllReactions;

impl ReactionLookup for AllReactions {
    fn has_reaction(&self, _monitor_id: i64, _event_name: &str) -> bool {
        true
    }
}

async fn connect(dir: &TempDir, reactions: Arc<dyn ReactionLookup>) -> Store {
    let db_path = dir.path().join("sentinela.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    Store::connect(&url, StoreSettings::default(), reactions, true)
        .await
        .unwrap()
}

async fn setup() -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    let store = connect(&dir, Arc::new(NoReactions)).await;
    (dir, store)
}

fn count_rule() -> AlertRule {
    AlertRule::Count(CountRule {
        priority_levels: PriorityLevels {
            low: Some(0.0),
            moderate: Some(10.0),
            high: Some(20.0),
            critical: Some(30.0),
            ..Default::default()
        },
    })
}

async fn seed_monitor(store: &Store, name: &str) -> i64 {
    store
        .register_monitor(name, "catalog://test", "deadbeef")
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn monitor_registration_is_idempotent() {
    let (_dir, store) = setup().await;

    let first = store
        .register_monitor("orders_stale", "catalog://orders", "v1")
        .await
        .unwrap();
    let second = store
        .register_monitor("orders_stale", "catalog://orders", "v1")
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
    assert!(second.enabled);

    let refreshed = store
        .register_monitor("orders_stale", "catalog://orders", "v2")
        .await
        .unwrap();
    assert_eq!(refreshed.id, first.id);
    assert_eq!(refreshed.version_hash, "v2");

    let by_name = store.get_monitor_by_name("orders_stale").await.unwrap();
    assert_eq!(by_name.unwrap().id, first.id);
}

#[tokio::test]
async fn run_lifecycle_upholds_running_implies_queued() {
    let (_dir, store) = setup().await;
    let monitor_id = seed_monitor(&store, "lifecycle").await;

    // Claim wins once.
    assert!(store.claim_monitor_for_run(monitor_id).await.unwrap());
    assert!(!store.claim_monitor_for_run(monitor_id).await.unwrap());

    let row = store.get_monitor(monitor_id).await.unwrap().unwrap();
    assert!(row.queued && !row.running);

    let token = store.begin_run(monitor_id).await.unwrap();
    let row = store.get_monitor(monitor_id).await.unwrap().unwrap();
    assert!(row.queued && row.running, "running implies queued");
    assert!(row.last_heartbeat.is_some());
    assert!(row.running_at.unwrap() >= row.queued_at.unwrap());

    // A second begin_run is rejected while one is in flight.
    assert!(store.begin_run(monitor_id).await.is_err());

    let beat_at = Utc::now();
    store.heartbeat(&token, beat_at).await.unwrap();
    let row = store.get_monitor(monitor_id).await.unwrap().unwrap();
    assert_eq!(row.last_heartbeat.unwrap().timestamp(), beat_at.timestamp());

    store
        .end_run(&token, &[RunKind::Search], RunOutcome::Success, None)
        .await
        .unwrap();
    let row = store.get_monitor(monitor_id).await.unwrap().unwrap();
    assert!(!row.queued && !row.running);
    assert!(row.last_successful_execution.is_some());

    let executions = store.list_monitor_executions(monitor_id, 10).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, "success");
    assert_eq!(executions[0].tasks, "search");
}

#[tokio::test]
async fn failed_run_keeps_last_successful_execution_unset() {
    let (_dir, store) = setup().await;
    let monitor_id = seed_monitor(&store, "failing").await;

    store.claim_monitor_for_run(monitor_id).await.unwrap();
    let token = store.begin_run(monitor_id).await.unwrap();
    store
        .end_run(
            &token,
            &[RunKind::Update],
            RunOutcome::Failed,
            Some("callback error".to_string()),
        )
        .await
        .unwrap();

    let row = store.get_monitor(monitor_id).await.unwrap().unwrap();
    assert!(row.last_successful_execution.is_none());
    let executions = store.list_monitor_executions(monitor_id, 10).await.unwrap();
    assert_eq!(executions[0].status, "failed");
    assert_eq!(executions[0].error.as_deref(), Some("callback error"));
}

#[tokio::test]
async fn begin_run_requires_a_claim() {
    let (_dir, store) = setup().await;
    let monitor_id = seed_monitor(&store, "unclaimed").await;
    assert!(store.begin_run(monitor_id).await.is_err());
}

#[tokio::test]
async fn disabled_monitors_cannot_be_claimed() {
    let (_dir, store) = setup().await;
    let monitor_id = seed_monitor(&store, "disabled").await;
    store.set_monitor_enabled(monitor_id, false).await.unwrap();
    assert!(!store.claim_monitor_for_run(monitor_id).await.unwrap());
}

#[tokio::test]
async fn upsert_issue_uniqueness_matrix() {
    let (_dir, store) = setup().await;
    let monitor_id = seed_monitor(&store, "uniqueness").await;

    let (issue, created) = store
        .upsert_issue(monitor_id, "1", json!({"id": 1}), false)
        .await
        .unwrap();
    assert!(created);
    assert_eq!(issue.status, IssueStatus::Active);

    // Active duplicate is returned, not recreated, and keeps its data.
    let (dup, created) = store
        .upsert_issue(monitor_id, "1", json!({"id": 1, "x": 2}), false)
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(dup.id, issue.id);
    assert_eq!(dup.data, json!({"id": 1}));

    // Terminal + non-unique: a fresh issue may be created.
    store.mark_issue_solved(issue.id).await.unwrap();
    let (second, created) = store
        .upsert_issue(monitor_id, "1", json!({"id": 1}), false)
        .await
        .unwrap();
    assert!(created);
    assert_ne!(second.id, issue.id);

    // Terminal + unique: blocked forever.
    store.mark_issue_dropped(second.id).await.unwrap();
    let (blocked, created) = store
        .upsert_issue(monitor_id, "1", json!({"id": 1}), true)
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(blocked.id, second.id);
}

#[tokio::test]
async fn issue_terminal_states_reject_further_transitions() {
    let (_dir, store) = setup().await;
    let monitor_id = seed_monitor(&store, "terminal").await;

    let (issue, _) = store
        .upsert_issue(monitor_id, "a", json!({"id": "a"}), false)
        .await
        .unwrap();

    let solved = store.mark_issue_solved(issue.id).await.unwrap().unwrap();
    assert_eq!(solved.status, IssueStatus::Solved);
    assert!(solved.solved_at.is_some());

    assert!(store.mark_issue_solved(issue.id).await.unwrap().is_none());
    assert!(store.mark_issue_dropped(issue.id).await.unwrap().is_none());
    assert!(store
        .update_issue_data(issue.id, json!({"id": "a", "v": 1}), false)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn update_issue_data_replaces_payload_without_status_change() {
    let (_dir, store) = setup().await;
    let monitor_id = seed_monitor(&store, "updates").await;

    let (issue, _) = store
        .upsert_issue(monitor_id, "a", json!({"id": "a", "v": 1}), false)
        .await
        .unwrap();
    let updated = store
        .update_issue_data(issue.id, json!({"id": "a", "v": 2}), false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, IssueStatus::Active);
    assert_eq!(updated.data["v"], 2);
}

#[tokio::test]
async fn recompute_creates_links_and_prioritizes() {
    let (_dir, store) = setup().await;
    let monitor_id = seed_monitor(&store, "recompute").await;
    let rule = count_rule();

    for i in 0..11 {
        store
            .upsert_issue(monitor_id, &i.to_string(), json!({"id": i}), false)
            .await
            .unwrap();
    }
    store.recompute_alert(monitor_id, &rule, false).await.unwrap();

    let alerts = store.active_alerts(monitor_id).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].priority, Some(Priority::Moderate));

    // Every active issue is linked to the alert.
    for issue in store.active_issues(monitor_id).await.unwrap() {
        assert_eq!(issue.alert_id, Some(alerts[0].id));
    }

    // Recomputing again stays at a single alert.
    store.recompute_alert(monitor_id, &rule, false).await.unwrap();
    assert_eq!(store.active_alerts(monitor_id).await.unwrap().len(), 1);

    // Ten more issues promote to high.
    for i in 11..21 {
        store
            .upsert_issue(monitor_id, &i.to_string(), json!({"id": i}), false)
            .await
            .unwrap();
    }
    store.recompute_alert(monitor_id, &rule, false).await.unwrap();
    let alert = store.get_alert(alerts[0].id).await.unwrap().unwrap();
    assert_eq!(alert.priority, Some(Priority::High));

    // Solving down to 15 active issues demotes back to moderate.
    let issues = store.active_issues(monitor_id).await.unwrap();
    for issue in issues.iter().take(6) {
        store.mark_issue_solved(issue.id).await.unwrap();
    }
    store.recompute_alert(monitor_id, &rule, false).await.unwrap();
    let alert = store.get_alert(alerts[0].id).await.unwrap().unwrap();
    assert_eq!(alert.priority, Some(Priority::Moderate));
}

#[tokio::test]
async fn alert_solves_when_all_issues_are_gone() {
    let (_dir, store) = setup().await;
    let monitor_id = seed_monitor(&store, "solving").await;
    let rule = count_rule();

    let (issue, _) = store
        .upsert_issue(monitor_id, "only", json!({"id": "only"}), false)
        .await
        .unwrap();
    store.recompute_alert(monitor_id, &rule, false).await.unwrap();
    let alert = store.active_alerts(monitor_id).await.unwrap().remove(0);

    store.mark_issue_solved(issue.id).await.unwrap();
    store.recompute_alert(monitor_id, &rule, false).await.unwrap();

    let alert = store.get_alert(alert.id).await.unwrap().unwrap();
    assert_eq!(alert.status, AlertStatus::Solved);
    assert!(alert.solved_at.is_some());
    assert!(store.active_alerts(monitor_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn locked_alert_keeps_its_issue_set_and_a_fresh_alert_opens() {
    let (_dir, store) = setup().await;
    let monitor_id = seed_monitor(&store, "locking").await;
    let rule = count_rule();

    store
        .upsert_issue(monitor_id, "first", json!({"id": "first"}), false)
        .await
        .unwrap();
    store.recompute_alert(monitor_id, &rule, false).await.unwrap();
    let alert_a = store.active_alerts(monitor_id).await.unwrap().remove(0);

    store.acknowledge_alert(alert_a.id).await.unwrap();
    store.lock_alert(alert_a.id).await.unwrap();

    // The next search produces one more issue: a fresh alert B.
    store
        .upsert_issue(monitor_id, "second", json!({"id": "second"}), false)
        .await
        .unwrap();
    store.recompute_alert(monitor_id, &rule, false).await.unwrap();

    let alerts = store.active_alerts(monitor_id).await.unwrap();
    assert_eq!(alerts.len(), 2);

    let a = alerts.iter().find(|a| a.id == alert_a.id).unwrap();
    assert!(a.locked);
    assert!(a.acknowledged);

    let b = alerts.iter().find(|a| a.id != alert_a.id).unwrap();
    let linked_to_b = store.active_issues(monitor_id).await.unwrap();
    let b_issues: Vec<_> = linked_to_b
        .iter()
        .filter(|i| i.alert_id == Some(b.id))
        .collect();
    let a_issues: Vec<_> = linked_to_b
        .iter()
        .filter(|i| i.alert_id == Some(alert_a.id))
        .collect();
    assert_eq!(b_issues.len(), 1);
    assert_eq!(b_issues[0].model_id, "second");
    assert_eq!(a_issues.len(), 1, "locked alert's linked set is unchanged");
}

#[tokio::test]
async fn priority_increase_past_acknowledged_level_dismisses_it() {
    let (_dir, store) = setup().await;
    let monitor_id = seed_monitor(&store, "ack_dismiss").await;
    let rule = count_rule();

    store
        .upsert_issue(monitor_id, "0", json!({"id": 0}), false)
        .await
        .unwrap();
    store.recompute_alert(monitor_id, &rule, false).await.unwrap();
    let alert = store.active_alerts(monitor_id).await.unwrap().remove(0);
    assert_eq!(alert.priority, Some(Priority::Low));

    let acked = store.acknowledge_alert(alert.id).await.unwrap().unwrap();
    assert!(acked.acknowledged);
    assert_eq!(acked.acknowledge_priority, Some(Priority::Low));

    for i in 1..11 {
        store
            .upsert_issue(monitor_id, &i.to_string(), json!({"id": i}), false)
            .await
            .unwrap();
    }
    store.recompute_alert(monitor_id, &rule, false).await.unwrap();

    let alert = store.get_alert(alert.id).await.unwrap().unwrap();
    assert_eq!(alert.priority, Some(Priority::Moderate));
    assert!(!alert.acknowledged, "increase past the acknowledged level");
    assert_eq!(alert.acknowledge_priority, None);
}

#[tokio::test]
async fn dismiss_acknowledge_on_new_issues_option() {
    let (_dir, store) = setup().await;
    let monitor_id = seed_monitor(&store, "ack_new_issues").await;
    let rule = count_rule();

    store
        .upsert_issue(monitor_id, "0", json!({"id": 0}), false)
        .await
        .unwrap();
    store.recompute_alert(monitor_id, &rule, true).await.unwrap();
    let alert = store.active_alerts(monitor_id).await.unwrap().remove(0);
    store.acknowledge_alert(alert.id).await.unwrap();

    // One more linked issue clears the acknowledgement even though the
    // priority is unchanged.
    store
        .upsert_issue(monitor_id, "1", json!({"id": 1}), false)
        .await
        .unwrap();
    store.recompute_alert(monitor_id, &rule, true).await.unwrap();

    let alert = store.get_alert(alert.id).await.unwrap().unwrap();
    assert_eq!(alert.priority, Some(Priority::Low));
    assert!(!alert.acknowledged);
}

#[tokio::test]
async fn stuck_monitors_are_found_and_reset() {
    let (_dir, store) = setup().await;
    let monitor_id = seed_monitor(&store, "stuck").await;

    store.claim_monitor_for_run(monitor_id).await.unwrap();
    let token = store.begin_run(monitor_id).await.unwrap();

    // Fresh heartbeat: not stuck.
    let stuck = store
        .find_stuck_monitors(Duration::seconds(300))
        .await
        .unwrap();
    assert!(stuck.is_empty());

    // Heartbeat stops; the last beat ages past the tolerance.
    store
        .heartbeat(&token, Utc::now() - Duration::seconds(301))
        .await
        .unwrap();
    let stuck = store
        .find_stuck_monitors(Duration::seconds(300))
        .await
        .unwrap();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].id, monitor_id);

    store.reset_stuck_monitor(monitor_id).await.unwrap();
    let row = store.get_monitor(monitor_id).await.unwrap().unwrap();
    assert!(!row.running && !row.queued);

    // Reset makes the monitor claimable again.
    assert!(store.claim_monitor_for_run(monitor_id).await.unwrap());
}

#[tokio::test]
async fn notification_lifecycle_and_solved_alert_scan() {
    let (_dir, store) = setup().await;
    let monitor_id = seed_monitor(&store, "notifications").await;
    let rule = count_rule();

    store
        .upsert_issue(monitor_id, "n", json!({"id": "n"}), false)
        .await
        .unwrap();
    store.recompute_alert(monitor_id, &rule, false).await.unwrap();
    let alert = store.active_alerts(monitor_id).await.unwrap().remove(0);

    let (notification, created) = store
        .create_notification(
            monitor_id,
            alert.id,
            "webhook",
            "webhook:pending",
            Priority::Informational,
            None,
        )
        .await
        .unwrap();
    assert!(created);
    assert_eq!(notification.status, NotificationStatus::Active);

    // At most one active notification per (alert, channel class).
    let (dup, created) = store
        .create_notification(
            monitor_id,
            alert.id,
            "webhook",
            "webhook:other",
            Priority::Informational,
            None,
        )
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(dup.id, notification.id);

    // Solve the alert and let the scan pick the notification up.
    assert!(store.solve_alert(alert.id, false).await.unwrap());
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let to_close = store
        .notifications_with_alert_solved(Duration::milliseconds(5))
        .await
        .unwrap();
    assert_eq!(to_close.len(), 1);
    assert_eq!(to_close[0].id, notification.id);

    let closed = store
        .close_notification(notification.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(closed.status, NotificationStatus::Closed);
    assert!(closed.closed_at.is_some());

    // Closed is terminal.
    assert!(store
        .close_notification(notification.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn manual_solve_refuses_solvable_monitors() {
    let (_dir, store) = setup().await;
    let monitor_id = seed_monitor(&store, "manual_solve").await;
    let rule = count_rule();

    store
        .upsert_issue(monitor_id, "m", json!({"id": "m"}), false)
        .await
        .unwrap();
    store.recompute_alert(monitor_id, &rule, false).await.unwrap();
    let alert = store.active_alerts(monitor_id).await.unwrap().remove(0);

    assert!(!store.solve_alert(alert.id, true).await.unwrap());
    let row = store.get_alert(alert.id).await.unwrap().unwrap();
    assert_eq!(row.status, AlertStatus::Active);

    assert!(store.solve_alert(alert.id, false).await.unwrap());
    let row = store.get_alert(alert.id).await.unwrap().unwrap();
    assert_eq!(row.status, AlertStatus::Solved);
    assert!(store.active_issues(monitor_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn variables_are_scoped_per_monitor() {
    let (_dir, store) = setup().await;
    let first = seed_monitor(&store, "vars_one").await;
    let second = seed_monitor(&store, "vars_two").await;

    store
        .set_variable(first, "cursor", Some("41".to_string()))
        .await
        .unwrap();
    store
        .set_variable(first, "cursor", Some("42".to_string()))
        .await
        .unwrap();

    assert_eq!(
        store.get_variable(first, "cursor").await.unwrap().as_deref(),
        Some("42")
    );
    assert_eq!(store.get_variable(second, "cursor").await.unwrap(), None);

    store.set_variable(first, "cursor", None).await.unwrap();
    assert_eq!(store.get_variable(first, "cursor").await.unwrap(), None);
    assert_eq!(store.list_variables(first).await.unwrap().len(), 1);
}

#[tokio::test]
async fn events_with_reactions_queue_for_the_outbox() {
    let dir = TempDir::new().unwrap();
    let store = connect(&dir, Arc::new(AllReactions)).await;
    let monitor_id = seed_monitor(&store, "outbox").await;

    store
        .upsert_issue(monitor_id, "e", json!({"id": "e"}), false)
        .await
        .unwrap();

    let pending = store.pending_events(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].event_name, "issue_created");
    assert_eq!(pending[0].event_source_monitor_id, monitor_id);

    let payload = pending[0].to_payload().unwrap();
    assert_eq!(payload.event_name, "issue_created");
    assert_eq!(payload.event_source, "issue");

    store.mark_event_published(pending[0].id).await.unwrap();
    assert!(store.pending_events(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn log_all_events_persists_without_pending_flag() {
    let (_dir, store) = setup().await;
    let monitor_id = seed_monitor(&store, "log_all").await;

    store
        .upsert_issue(monitor_id, "l", json!({"id": "l"}), false)
        .await
        .unwrap();

    // No reactions are registered, but log_all_events keeps the row.
    assert!(store.count_events().await.unwrap() >= 1);
    assert!(store.pending_events(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn clean_events_removes_only_published_old_rows() {
    let dir = TempDir::new().unwrap();
    let store = connect(&dir, Arc::new(AllReactions)).await;
    let monitor_id = seed_monitor(&store, "clean").await;

    store
        .upsert_issue(monitor_id, "c", json!({"id": "c"}), false)
        .await
        .unwrap();

    // Pending events survive the cleanup regardless of age.
    let removed = store
        .delete_events_older_than(Utc::now() + Duration::seconds(60))
        .await
        .unwrap();
    assert_eq!(removed, 0);

    let pending = store.pending_events(10).await.unwrap();
    store.mark_event_published(pending[0].id).await.unwrap();

    let removed = store
        .delete_events_older_than(Utc::now() + Duration::seconds(60))
        .await
        .unwrap();
    assert_eq!(removed, 1);
}
