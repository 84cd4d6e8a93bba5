mod common;

use common::{harness, run_monitor, scripted_definition, ScriptedMonitor};
use sentinela_alert::{AlertRule, CountRule, PriorityLevels};
use sentinela_common::types::{AlertStatus, EventPayload, IssueStatus, Priority, RunKind};
use sentinela_queue::WorkQueue;
use sentinela_registry::{AlertOptions, DefinitionCatalog, IssueOptions, ReactionOptions};
use sentinela_server::controller::procedures::ProcedureRunner;
use sentinela_server::{executor, loader, outbox};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn count_alert() -> Option<AlertOptions> {
    Some(AlertOptions::new(AlertRule::Count(CountRule {
        priority_levels: PriorityLevels {
            low: Some(0.0),
            moderate: Some(10.0),
            high: Some(20.0),
            ..Default::default()
        },
    })))
}

#[tokio::test]
async fn search_run_creates_issues_and_skips_already_solved_entries() {
    let code = Arc::new(ScriptedMonitor::new());
    code.push_search(vec![
        json!({"id": "a", "value": 1}),
        json!({"id": "b", "value": 2, "solved": true}),
        json!({"id": "a", "value": 9}),
        json!({"no_model_id": true}),
    ]);

    let mut catalog = DefinitionCatalog::new();
    catalog.insert(
        "flow_search",
        scripted_definition(code.clone(), IssueOptions::new("id"), count_alert()),
    );
    let h = harness(catalog).await;
    let monitor = h
        .state
        .store
        .get_monitor_by_name("flow_search")
        .await
        .unwrap()
        .unwrap();

    run_monitor(&h, monitor.id, &[RunKind::Search]).await;

    // Only the first "a" entry survives: "b" is already solved, the
    // duplicate and the keyless entry are dropped.
    let issues = h.state.store.active_issues(monitor.id).await.unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].model_id, "a");
    assert_eq!(issues[0].data["value"], 1);

    // The alert routine linked it under a fresh alert.
    let alerts = h.state.store.active_alerts(monitor.id).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].priority, Some(Priority::Low));
    let linked = h.state.store.active_issues(monitor.id).await.unwrap();
    assert_eq!(linked[0].alert_id, Some(alerts[0].id));

    // The run is closed and bookkeeping is updated.
    let row = h.state.store.get_monitor(monitor.id).await.unwrap().unwrap();
    assert!(!row.queued && !row.running);
    assert!(row.search_executed_at.is_some());
    assert!(row.last_successful_execution.is_some());
}

#[tokio::test]
async fn update_run_refreshes_data_and_solves_issues() {
    let code = Arc::new(ScriptedMonitor::new());
    code.push_search(vec![
        json!({"id": "x", "value": 1}),
        json!({"id": "y", "value": 2}),
    ]);

    let mut catalog = DefinitionCatalog::new();
    catalog.insert(
        "flow_update",
        scripted_definition(code.clone(), IssueOptions::new("id"), count_alert()),
    );
    let h = harness(catalog).await;
    let monitor = h
        .state
        .store
        .get_monitor_by_name("flow_update")
        .await
        .unwrap()
        .unwrap();

    run_monitor(&h, monitor.id, &[RunKind::Search]).await;
    assert_eq!(h.state.store.active_issues(monitor.id).await.unwrap().len(), 2);
    let alert = h.state.store.active_alerts(monitor.id).await.unwrap().remove(0);

    // The update marks "x" solved and refreshes "y".
    code.push_update(vec![
        json!({"id": "x", "value": 0, "solved": true}),
        json!({"id": "y", "value": 5}),
    ]);
    run_monitor(&h, monitor.id, &[RunKind::Update]).await;

    let issues = h.state.store.active_issues(monitor.id).await.unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].model_id, "y");
    assert_eq!(issues[0].data["value"], 5);

    // Solving the last issue closes the alert within one more pass.
    code.push_update(vec![json!({"id": "y", "value": 0, "solved": true})]);
    run_monitor(&h, monitor.id, &[RunKind::Update]).await;

    let alert = h.state.store.get_alert(alert.id).await.unwrap().unwrap();
    assert_eq!(alert.status, AlertStatus::Solved);
    assert!(h.state.store.active_issues(monitor.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn non_solvable_unique_monitor_never_duplicates_its_issue() {
    let code = Arc::new(ScriptedMonitor::new());

    let mut catalog = DefinitionCatalog::new();
    catalog.insert(
        "flow_unique",
        scripted_definition(
            code.clone(),
            IssueOptions::new("id").not_solvable().unique(),
            count_alert(),
        ),
    );
    let h = harness(catalog).await;
    let monitor = h
        .state
        .store
        .get_monitor_by_name("flow_unique")
        .await
        .unwrap()
        .unwrap();

    // Search repeatedly returns the same issue.
    for _ in 0..3 {
        code.push_search(vec![json!({"id": 1, "note": "still broken"})]);
        run_monitor(&h, monitor.id, &[RunKind::Search]).await;
    }

    let issues = h.state.store.active_issues(monitor.id).await.unwrap();
    assert_eq!(issues.len(), 1, "exactly one active issue for model_id=1");
    let issue_id = issues[0].id;

    // Manual drop through the request path.
    executor::request_handler::run(
        &h.state,
        json!({ "action": "issue_drop", "params": { "issue_id": issue_id } }),
    )
    .await
    .unwrap();
    let issue = h.state.store.get_issue(issue_id).await.unwrap().unwrap();
    assert_eq!(issue.status, IssueStatus::Dropped);

    // Unique monitors never recreate a terminal model id.
    code.push_search(vec![json!({"id": 1, "note": "still broken"})]);
    run_monitor(&h, monitor.id, &[RunKind::Search]).await;
    assert!(h.state.store.active_issues(monitor.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn execution_timeout_ends_the_run_as_timed_out() {
    let mut scripted = ScriptedMonitor::new();
    scripted.search_delay = Some(Duration::from_millis(500));
    let code = Arc::new(scripted);
    code.push_search(vec![json!({"id": "slow"})]);

    let mut definition =
        scripted_definition(code.clone(), IssueOptions::new("id"), count_alert());
    definition.monitor_options.execution_timeout = Some(Duration::from_millis(50));

    let mut catalog = DefinitionCatalog::new();
    catalog.insert("flow_timeout", definition);
    let h = harness(catalog).await;
    let monitor = h
        .state
        .store
        .get_monitor_by_name("flow_timeout")
        .await
        .unwrap()
        .unwrap();

    run_monitor(&h, monitor.id, &[RunKind::Search]).await;

    // The run is released with a timeout outcome and no issues.
    let row = h.state.store.get_monitor(monitor.id).await.unwrap().unwrap();
    assert!(!row.queued && !row.running);
    assert!(row.last_successful_execution.is_none());
    assert!(h.state.store.active_issues(monitor.id).await.unwrap().is_empty());

    let executions = h
        .state
        .store
        .list_monitor_executions(monitor.id, 10)
        .await
        .unwrap();
    assert_eq!(executions[0].status, "timeout");
}

#[tokio::test]
async fn stuck_monitor_is_reset_by_the_procedure() {
    let code = Arc::new(ScriptedMonitor::new());
    let mut catalog = DefinitionCatalog::new();
    catalog.insert(
        "flow_stuck",
        scripted_definition(code, IssueOptions::new("id"), None),
    );
    let h = harness(catalog).await;
    let monitor = h
        .state
        .store
        .get_monitor_by_name("flow_stuck")
        .await
        .unwrap()
        .unwrap();

    // A run starts and its heartbeat goes silent past the tolerance.
    h.state.store.claim_monitor_for_run(monitor.id).await.unwrap();
    let token = h.state.store.begin_run(monitor.id).await.unwrap();
    h.state
        .store
        .heartbeat(&token, chrono::Utc::now() - chrono::Duration::seconds(301))
        .await
        .unwrap();

    ProcedureRunner::new(h.state.clone()).run_triggered().await;

    let row = h.state.store.get_monitor(monitor.id).await.unwrap().unwrap();
    assert!(!row.running && !row.queued);
    let stuck_events = h
        .state
        .store
        .list_events(monitor.id, "monitor_stuck")
        .await
        .unwrap();
    assert_eq!(stuck_events.len(), 1);
}

#[tokio::test]
async fn committed_events_reach_registered_reactions_through_the_queue() {
    let received: Arc<Mutex<Vec<EventPayload>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();

    let code = Arc::new(ScriptedMonitor::new());
    code.push_search(vec![json!({"id": "evt"})]);

    let mut definition = scripted_definition(code, IssueOptions::new("id"), count_alert());
    definition.reaction_options = ReactionOptions::new().on("issue_created", move |payload| {
        let sink = sink.clone();
        Box::pin(async move {
            sink.lock().unwrap().push(payload);
            Ok(())
        })
    });

    let mut catalog = DefinitionCatalog::new();
    catalog.insert("flow_reactions", definition);
    let h = harness(catalog).await;
    let monitor = h
        .state
        .store
        .get_monitor_by_name("flow_reactions")
        .await
        .unwrap()
        .unwrap();

    run_monitor(&h, monitor.id, &[RunKind::Search]).await;

    // The transition committed an outbox event for the reaction.
    let published = outbox::flush(&h.state).await.unwrap();
    assert!(published >= 1);

    // Drain the queue the way an executor would.
    let mut event_messages = 0;
    while let Some(message) = h.queue.receive(Duration::from_millis(20)).await.unwrap() {
        if message.kind == sentinela_queue::MessageKind::Event {
            executor::reaction_handler::run(&h.state, message.payload.clone())
                .await
                .unwrap();
            event_messages += 1;
        }
        h.queue.ack(&message).await.unwrap();
    }
    assert!(event_messages >= 1, "at least one event message delivered");

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].event_name, "issue_created");
    assert_eq!(received[0].event_source_monitor_id, monitor.id);
}

#[tokio::test]
async fn request_actions_drive_alert_lifecycle() {
    let code = Arc::new(ScriptedMonitor::new());
    code.push_search(vec![json!({"id": "req"})]);

    let mut catalog = DefinitionCatalog::new();
    catalog.insert(
        "flow_requests",
        scripted_definition(
            code,
            IssueOptions::new("id").not_solvable(),
            count_alert(),
        ),
    );
    let h = harness(catalog).await;
    let monitor = h
        .state
        .store
        .get_monitor_by_name("flow_requests")
        .await
        .unwrap()
        .unwrap();

    run_monitor(&h, monitor.id, &[RunKind::Search]).await;
    let alert = h.state.store.active_alerts(monitor.id).await.unwrap().remove(0);

    executor::request_handler::run(
        &h.state,
        json!({ "action": "alert_acknowledge", "params": { "alert_id": alert.id } }),
    )
    .await
    .unwrap();
    executor::request_handler::run(
        &h.state,
        json!({ "action": "alert_lock", "params": { "alert_id": alert.id } }),
    )
    .await
    .unwrap();

    let row = h.state.store.get_alert(alert.id).await.unwrap().unwrap();
    assert!(row.acknowledged);
    assert!(row.locked);

    // Manual solve works because the monitor's issues are not solvable.
    executor::request_handler::run(
        &h.state,
        json!({ "action": "alert_solve", "params": { "alert_id": alert.id } }),
    )
    .await
    .unwrap();
    let row = h.state.store.get_alert(alert.id).await.unwrap().unwrap();
    assert_eq!(row.status, AlertStatus::Solved);

    // Unknown actions are dropped without failing the handler.
    executor::request_handler::run(&h.state, json!({ "action": "warp_core_eject" }))
        .await
        .unwrap();
}

#[tokio::test]
async fn monitor_disable_request_blocks_scheduling() {
    let code = Arc::new(ScriptedMonitor::new());
    let mut catalog = DefinitionCatalog::new();
    catalog.insert(
        "flow_disable",
        scripted_definition(code, IssueOptions::new("id"), None),
    );
    let h = harness(catalog).await;
    let monitor = h
        .state
        .store
        .get_monitor_by_name("flow_disable")
        .await
        .unwrap()
        .unwrap();

    executor::request_handler::run(
        &h.state,
        json!({ "action": "monitor_disable", "params": { "monitor_name": "flow_disable" } }),
    )
    .await
    .unwrap();

    let row = h.state.store.get_monitor(monitor.id).await.unwrap().unwrap();
    assert!(!row.enabled);
    assert!(!h.state.store.claim_monitor_for_run(monitor.id).await.unwrap());

    let enabled_changed = h
        .state
        .store
        .list_events(monitor.id, "monitor_enabled_changed")
        .await
        .unwrap();
    assert_eq!(enabled_changed.len(), 1);

    executor::request_handler::run(
        &h.state,
        json!({ "action": "monitor_enable", "params": { "monitor_name": "flow_disable" } }),
    )
    .await
    .unwrap();
    let row = h.state.store.get_monitor(monitor.id).await.unwrap().unwrap();
    assert!(row.enabled);
}

#[tokio::test]
async fn message_for_unknown_monitor_records_not_registered() {
    let catalog = DefinitionCatalog::new();
    let h = harness(catalog).await;

    // A monitor row without a catalog definition: the loader cannot
    // attach code to it.
    let orphan = h
        .state
        .store
        .register_monitor("orphan_monitor", "catalog://gone", "v1")
        .await
        .unwrap();

    // Keep a loader task alive so the early-wake reload request is
    // answered instead of timing out.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let loader_task = tokio::spawn(loader::run(h.state.clone(), shutdown_rx));

    h.state.store.claim_monitor_for_run(orphan.id).await.unwrap();
    let payload = json!({ "monitor_id": orphan.id, "tasks": ["search"] });
    executor::monitor_handler::run(&h.state, payload, Arc::new(Mutex::new(None)))
        .await
        .unwrap();

    let row = h.state.store.get_monitor(orphan.id).await.unwrap().unwrap();
    assert!(!row.queued && !row.running);
    let executions = h
        .state
        .store
        .list_monitor_executions(orphan.id, 10)
        .await
        .unwrap();
    assert_eq!(executions[0].status, "not_registered");

    let _ = shutdown_tx.send(true);
    loader_task.abort();
}
