//! Janitorial procedures run by the Controller on their own crons.
//!
//! `monitors_stuck` reclaims monitors whose executor died mid-run,
//! `notifications_alert_solved` closes notifications left open after
//! their alert solved, and `clean_events` prunes old event rows.

use crate::metrics;
use crate::state::AppState;
use chrono::{DateTime, Duration, Utc};
use sentinela_common::time::{is_triggered, parse_cron};
use std::collections::HashMap;
use std::sync::Mutex;

/// Default seconds without a heartbeat before a run counts as stuck.
/// Should be at least twice the executor heartbeat interval.
const DEFAULT_TIME_TOLERANCE: i64 = 300;
/// Solved-for window before open notifications are closed.
const DEFAULT_ALERT_SOLVED_FOR: i64 = 300;
/// Default retention for event rows, in days.
const DEFAULT_EVENTS_MAX_AGE_DAYS: i64 = 30;

pub struct ProcedureRunner {
    state: AppState,
    last_executions: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl ProcedureRunner {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            last_executions: Mutex::new(HashMap::new()),
        }
    }

    /// Run every configured procedure whose schedule has fired since
    /// its last execution.
    pub async fn run_triggered(&self) {
        let procedure_names: Vec<String> = self
            .state
            .config
            .controller_procedures
            .keys()
            .cloned()
            .collect();

        for name in procedure_names {
            if !self.is_triggered(&name) {
                continue;
            }
            self.execute(&name).await;
            self.last_executions
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(name, Utc::now());
        }
    }

    fn is_triggered(&self, name: &str) -> bool {
        let Some(settings) = self.state.config.controller_procedures.get(name) else {
            return false;
        };
        let last = self
            .last_executions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .copied();
        let Some(last) = last else {
            return true;
        };
        match parse_cron(&settings.schedule) {
            Ok(schedule) => is_triggered(&schedule, self.state.time_zone, last, Utc::now()),
            Err(e) => {
                tracing::error!(procedure = %name, error = %e, "Invalid procedure schedule");
                false
            }
        }
    }

    async fn execute(&self, name: &str) {
        let params = self
            .state
            .config
            .controller_procedures
            .get(name)
            .map(|settings| settings.params.clone())
            .unwrap_or_default();

        let result = match name {
            "monitors_stuck" => monitors_stuck(&self.state, &params).await,
            "notifications_alert_solved" => {
                notifications_alert_solved(&self.state, &params).await
            }
            "clean_events" => clean_events(&self.state, &params).await,
            _ => {
                tracing::warn!(procedure = %name, "Unknown procedure configured");
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::error!(procedure = %name, error = %e, "Procedure failed");
        }
    }
}

fn param_i64(params: &HashMap<String, serde_json::Value>, key: &str, default: i64) -> i64 {
    params.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
}

/// Reset monitors that are running without a recent heartbeat so they
/// can be queued again.
async fn monitors_stuck(
    state: &AppState,
    params: &HashMap<String, serde_json::Value>,
) -> anyhow::Result<()> {
    let time_tolerance = param_i64(params, "time_tolerance", DEFAULT_TIME_TOLERANCE);
    let stuck = state
        .store
        .find_stuck_monitors(Duration::seconds(time_tolerance))
        .await?;

    for monitor in stuck {
        state.store.reset_stuck_monitor(monitor.id).await?;
        metrics::inc(&metrics::MONITORS_STUCK_RESET);
        tracing::warn!(monitor = %monitor.name, "Monitor was stuck and now it's fixed");
    }
    Ok(())
}

/// Close active notifications whose alert has been solved for a while.
async fn notifications_alert_solved(
    state: &AppState,
    params: &HashMap<String, serde_json::Value>,
) -> anyhow::Result<()> {
    let solved_for = param_i64(params, "solved_for", DEFAULT_ALERT_SOLVED_FOR);
    let notifications = state
        .store
        .notifications_with_alert_solved(Duration::seconds(solved_for))
        .await?;

    for notification in notifications {
        state.store.close_notification(notification.id).await?;
        tracing::warn!(
            notification_id = notification.id,
            alert_id = notification.alert_id,
            "Notification closed, alert already solved"
        );
    }
    Ok(())
}

/// Prune published events older than the retention window.
async fn clean_events(
    state: &AppState,
    params: &HashMap<String, serde_json::Value>,
) -> anyhow::Result<()> {
    let max_age_days = param_i64(params, "max_age", DEFAULT_EVENTS_MAX_AGE_DAYS);
    let cutoff = Utc::now() - Duration::days(max_age_days);
    let removed = state.store.delete_events_older_than(cutoff).await?;
    if removed > 0 {
        tracing::info!(removed, "Cleaned up old events");
    }
    Ok(())
}
