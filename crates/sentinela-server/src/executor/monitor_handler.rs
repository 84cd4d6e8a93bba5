use crate::metrics;
use crate::state::AppState;
use chrono::Utc;
use sentinela_common::types::{RunKind, RunOutcome, RunToken};
use sentinela_common::value::{extract_model_id, IssueData};
use sentinela_registry::LoadedMonitor;
use sentinela_storage::MonitorRow;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct MonitorMessage {
    monitor_id: i64,
    tasks: Vec<RunKind>,
}

/// Process a `monitor` message: begin the run, execute the scheduled
/// routines under the monitor's execution timeout, and end the run with
/// the outcome. Failures never escape; the message is always acked by
/// the caller.
pub async fn run(
    state: &AppState,
    payload: serde_json::Value,
    run_token: Arc<Mutex<Option<RunToken>>>,
) -> anyhow::Result<()> {
    let message: MonitorMessage = match serde_json::from_value(payload) {
        Ok(message) => message,
        Err(e) => {
            tracing::error!(error = %e, "Invalid monitor message payload");
            return Ok(());
        }
    };
    let monitor_id = message.monitor_id;

    let Some(monitor) = state.store.get_monitor(monitor_id).await? else {
        tracing::error!(monitor_id, "Monitor not found, skipping message");
        return Ok(());
    };
    // Redelivered message racing an in-flight run: skip.
    if monitor.running {
        tracing::info!(monitor = %monitor.name, "Monitor already running, skipping");
        return Ok(());
    }

    let token = match state.store.begin_run(monitor_id).await {
        Ok(token) => token,
        Err(e) => {
            tracing::info!(monitor = %monitor.name, error = %e, "Could not begin run, skipping");
            return Ok(());
        }
    };
    *run_token
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token);

    // Resolve the definition, waking the loader when it is missing.
    let loaded = match state.registry.wait_monitor_loaded(monitor_id).await {
        Ok(()) => state.registry.get(monitor_id),
        Err(_) => None,
    };
    let Some(loaded) = loaded else {
        metrics::inc(&metrics::MONITOR_NOT_REGISTERED);
        tracing::error!(monitor = %monitor.name, "Monitor not registered, ending run");
        state
            .store
            .end_run(&token, &message.tasks, RunOutcome::NotRegistered, None)
            .await?;
        return Ok(());
    };

    let timeout = loaded
        .definition
        .monitor_options
        .execution_timeout
        .unwrap_or(Duration::from_secs(state.config.executor_monitor_timeout));

    let outcome = tokio::time::timeout(
        timeout,
        run_routines(state, &monitor, &loaded, &message.tasks),
    )
    .await;

    match outcome {
        Ok(Ok(())) => {
            state
                .store
                .end_run(&token, &message.tasks, RunOutcome::Success, None)
                .await?;
        }
        Ok(Err(e)) => {
            metrics::inc_with(&metrics::MONITOR_EXECUTION_ERRORS, &[monitor.name.as_str()]);
            tracing::error!(monitor = %monitor.name, error = %e, "Error in monitor execution");
            state
                .store
                .end_run(&token, &message.tasks, RunOutcome::Failed, Some(e.to_string()))
                .await?;
        }
        Err(_) => {
            metrics::inc_with(&metrics::MONITOR_EXECUTION_TIMEOUTS, &[monitor.name.as_str()]);
            tracing::warn!(monitor = %monitor.name, "Monitor execution timed out");
            state
                .store
                .end_run(
                    &token,
                    &message.tasks,
                    RunOutcome::Timeout,
                    Some(format!("execution exceeded {}s", timeout.as_secs())),
                )
                .await?;
        }
    }

    // The run is over; stop heartbeating it.
    run_token
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    Ok(())
}

/// Execute the scheduled routines in order: update, solve, search,
/// alerts. The solve pass runs even without an update task so manual
/// data fixes settle; the alerts pass always recomputes.
async fn run_routines(
    state: &AppState,
    monitor: &MonitorRow,
    loaded: &LoadedMonitor,
    tasks: &[RunKind],
) -> anyhow::Result<()> {
    let ctx = state.monitor_context(monitor.id, &monitor.name);

    if tasks.contains(&RunKind::Update) {
        update_routine(state, monitor, loaded, &ctx).await?;
        state
            .store
            .set_update_executed_at(monitor.id, Utc::now())
            .await?;
    }

    solve_routine(state, monitor, loaded).await?;

    if tasks.contains(&RunKind::Search) {
        search_routine(state, monitor, loaded, &ctx).await?;
        state
            .store
            .set_search_executed_at(monitor.id, Utc::now())
            .await?;
    }

    alerts_routine(state, monitor, loaded).await?;
    Ok(())
}

/// Run `search` and create issues from the entries that survive the
/// filters: a usable model id, not already active, not a duplicate in
/// the batch, not already solved, and inside the creation limit.
async fn search_routine(
    state: &AppState,
    monitor: &MonitorRow,
    loaded: &LoadedMonitor,
    ctx: &sentinela_registry::MonitorContext,
) -> anyhow::Result<()> {
    let definition = &loaded.definition;
    let Some(found) = definition.code.search(ctx).await? else {
        return Ok(());
    };
    if found.is_empty() {
        return Ok(());
    }

    let model_id_key = &definition.issue_options.model_id_key;
    let active_model_ids: HashSet<String> = state
        .store
        .active_issues(monitor.id)
        .await?
        .into_iter()
        .map(|issue| issue.model_id)
        .collect();

    let mut seen: HashSet<String> = HashSet::new();
    let mut new_issues: Vec<(String, IssueData)> = Vec::new();
    for issue_data in found {
        let Some(model_id) = extract_model_id(&issue_data, model_id_key) else {
            tracing::warn!(
                monitor = %monitor.name,
                model_id_key,
                "Search entry without a usable model id, skipping"
            );
            continue;
        };
        if active_model_ids.contains(&model_id) {
            continue;
        }
        if !seen.insert(model_id.clone()) {
            tracing::warn!(monitor = %monitor.name, model_id, "Duplicate model id in search result");
            continue;
        }
        if definition.issue_options.solvable && definition.code.is_solved(&issue_data)? {
            continue;
        }
        new_issues.push((model_id, issue_data));
    }

    // Cap creation after filtering so newer entries are not lost to
    // entries that would have been dropped anyway.
    let max_issues = definition
        .monitor_options
        .max_issues_creation
        .unwrap_or(state.config.max_issues_creation);
    if new_issues.len() > max_issues {
        metrics::inc_with(&metrics::SEARCH_ISSUES_LIMIT_REACHED, &[monitor.name.as_str()]);
        tracing::warn!(
            monitor = %monitor.name,
            found = new_issues.len(),
            max_issues,
            "Search issues limit reached, truncating"
        );
        new_issues.truncate(max_issues);
    }

    for (model_id, issue_data) in new_issues {
        state
            .store
            .upsert_issue(
                monitor.id,
                &model_id,
                serde_json::Value::Object(issue_data),
                definition.issue_options.unique,
            )
            .await?;
    }
    Ok(())
}

/// Run `update` over the active issues' data and store the refreshed
/// payloads, matched back by model id.
async fn update_routine(
    state: &AppState,
    monitor: &MonitorRow,
    loaded: &LoadedMonitor,
    ctx: &sentinela_registry::MonitorContext,
) -> anyhow::Result<()> {
    let definition = &loaded.definition;
    let active_issues = state.store.active_issues(monitor.id).await?;
    if active_issues.is_empty() {
        return Ok(());
    }

    let issues_data: Vec<IssueData> = active_issues
        .iter()
        .filter_map(|issue| issue.data.as_object().cloned())
        .collect();
    let Some(updates) = definition.code.update(ctx, issues_data).await? else {
        return Ok(());
    };

    let model_id_key = &definition.issue_options.model_id_key;
    let by_model_id: HashMap<&str, &sentinela_storage::IssueRow> = active_issues
        .iter()
        .map(|issue| (issue.model_id.as_str(), issue))
        .collect();

    let mut seen: HashSet<String> = HashSet::new();
    for issue_data in updates {
        let Some(model_id) = extract_model_id(&issue_data, model_id_key) else {
            tracing::warn!(
                monitor = %monitor.name,
                model_id_key,
                "Update entry without a usable model id, skipping"
            );
            continue;
        };
        if !seen.insert(model_id.clone()) {
            tracing::warn!(monitor = %monitor.name, model_id, "Duplicate model id in update result");
            continue;
        }
        let Some(issue) = by_model_id.get(model_id.as_str()) else {
            tracing::warn!(
                monitor = %monitor.name,
                model_id,
                "Updated issue not found in active issues, maybe it changed during the update"
            );
            continue;
        };

        let solved_hint =
            definition.issue_options.solvable && definition.code.is_solved(&issue_data)?;
        state
            .store
            .update_issue_data(issue.id, serde_json::Value::Object(issue_data), solved_hint)
            .await?;
    }
    Ok(())
}

/// Evaluate `is_solved` over every active issue and solve the positive
/// ones. Skipped entirely for non-solvable monitors.
async fn solve_routine(
    state: &AppState,
    monitor: &MonitorRow,
    loaded: &LoadedMonitor,
) -> anyhow::Result<()> {
    let definition = &loaded.definition;
    if !definition.issue_options.solvable {
        return Ok(());
    }

    for issue in state.store.active_issues(monitor.id).await? {
        let Some(issue_data) = issue.data.as_object() else {
            continue;
        };
        if definition.code.is_solved(issue_data)? {
            state.store.mark_issue_solved(issue.id).await?;
        }
    }
    Ok(())
}

async fn alerts_routine(
    state: &AppState,
    monitor: &MonitorRow,
    loaded: &LoadedMonitor,
) -> anyhow::Result<()> {
    let Some(alert_options) = &loaded.definition.alert_options else {
        return Ok(());
    };
    state
        .store
        .recompute_alert(
            monitor.id,
            &alert_options.rule,
            alert_options.dismiss_acknowledge_on_new_issues,
        )
        .await?;
    Ok(())
}
