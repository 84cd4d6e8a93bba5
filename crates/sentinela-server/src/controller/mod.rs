pub mod procedures;

use crate::metrics;
use crate::state::AppState;
use chrono::Utc;
use sentinela_common::time::{is_triggered, parse_cron, time_until_next_trigger};
use sentinela_common::types::RunKind;
use sentinela_queue::MessageKind;
use sentinela_registry::LoadedMonitor;
use sentinela_storage::MonitorRow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};

/// Cron-driven scheduler: claims due monitors and enqueues their work,
/// and runs the janitorial procedures on their own schedules.
///
/// The design stays safe under duplicate controllers because every
/// transition is guarded by store conditionals; the claim CAS decides
/// who enqueues.
pub struct Controller {
    state: AppState,
    procedures: procedures::ProcedureRunner,
}

impl Controller {
    pub fn new(state: AppState) -> Self {
        let procedures = procedures::ProcedureRunner::new(state.clone());
        Self { state, procedures }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let schedule = match parse_cron(&self.state.config.controller_process_schedule) {
            Ok(schedule) => schedule,
            Err(e) => {
                tracing::error!(error = %e, "Invalid controller_process_schedule, controller not running");
                return;
            }
        };
        let semaphore = Arc::new(Semaphore::new(self.state.config.controller_concurrency));

        tracing::info!("Controller running");

        while !*shutdown.borrow() {
            if let Err(e) = self.state.registry.wait_monitors_ready().await {
                tracing::error!(error = %e, "Monitors not ready, skipping controller loop");
            } else {
                self.state.diagnostics.controller_looped();
                self.process_tick(&semaphore).await;
            }

            let until_next =
                time_until_next_trigger(&schedule, self.state.time_zone, Utc::now());
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(until_next.max(1))) => {}
                _ = shutdown.changed() => {}
            }
        }

        tracing::info!("Controller finishing");
    }

    /// One scheduling pass: run due procedures in the background and
    /// fan out over the enabled monitors under the concurrency bound.
    async fn process_tick(&self, semaphore: &Arc<Semaphore>) {
        self.procedures.run_triggered().await;

        let monitors = match self.state.store.list_enabled_monitors().await {
            Ok(monitors) => monitors,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list enabled monitors");
                return;
            }
        };

        let mut tasks = Vec::new();
        for monitor in monitors {
            let Some(loaded) = self.state.registry.get(monitor.id) else {
                metrics::inc(&metrics::MONITOR_NOT_REGISTERED);
                tracing::warn!(monitor = %monitor.name, "Monitor is not registered, skipping");
                continue;
            };

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let state = self.state.clone();
            tasks.push(tokio::spawn(async move {
                process_monitor(&state, &monitor, &loaded).await;
                drop(permit);
            }));
        }

        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Monitor processing task panicked");
            }
        }
    }
}

/// Check which routines the monitor's crons trigger and queue them.
async fn process_monitor(state: &AppState, monitor: &MonitorRow, loaded: &LoadedMonitor) {
    metrics::inc(&metrics::CONTROLLER_MONITORS_PROCESSED);
    state.diagnostics.monitor_processed();

    let mut tasks = Vec::new();
    if routine_triggered(
        state,
        monitor,
        loaded.definition.monitor_options.search_cron.as_deref(),
        monitor.search_executed_at,
    ) {
        tasks.push(RunKind::Search);
    }
    if routine_triggered(
        state,
        monitor,
        loaded.definition.monitor_options.update_cron.as_deref(),
        monitor.update_executed_at,
    ) {
        tasks.push(RunKind::Update);
    }

    if tasks.is_empty() {
        return;
    }

    tracing::info!(monitor = %monitor.name, ?tasks, "Monitor triggered");
    queue_monitor_tasks(state, monitor, &tasks).await;
}

fn routine_triggered(
    state: &AppState,
    monitor: &MonitorRow,
    cron: Option<&str>,
    last_execution: Option<chrono::DateTime<Utc>>,
) -> bool {
    if !monitor.enabled || monitor.queued || monitor.running {
        return false;
    }
    let Some(expression) = cron else {
        return false;
    };
    let schedule = match parse_cron(expression) {
        Ok(schedule) => schedule,
        Err(e) => {
            tracing::error!(monitor = %monitor.name, error = %e, "Invalid monitor cron");
            return false;
        }
    };
    match last_execution {
        None => true,
        Some(last) => is_triggered(&schedule, state.time_zone, last, Utc::now()),
    }
}

/// Claim the monitor and enqueue its work, reverting the claim when the
/// queue rejects the message.
async fn queue_monitor_tasks(state: &AppState, monitor: &MonitorRow, tasks: &[RunKind]) {
    match state.store.claim_monitor_for_run(monitor.id).await {
        Ok(true) => {}
        Ok(false) => return,
        Err(e) => {
            tracing::error!(monitor = %monitor.name, error = %e, "Failed to claim monitor");
            return;
        }
    }

    let payload = serde_json::json!({
        "monitor_id": monitor.id,
        "tasks": tasks,
    });
    if let Err(e) = state.queue.send(MessageKind::Monitor, payload).await {
        metrics::inc(&metrics::CONTROLLER_QUEUE_ERRORS);
        tracing::error!(
            monitor = %monitor.name,
            error = %e,
            "Error while queueing the task, reverting queued state"
        );
        if let Err(e) = state.store.revert_monitor_claim(monitor.id).await {
            tracing::error!(monitor = %monitor.name, error = %e, "Failed to revert claim");
        }
    }
}
