pub mod monitor_handler;
pub mod reaction_handler;
pub mod request_handler;

use crate::metrics;
use crate::state::AppState;
use chrono::Utc;
use sentinela_common::types::RunToken;
use sentinela_queue::{Message, MessageKind};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Worker pool consuming queue messages and dispatching them to the
/// per-kind handlers under their timeouts.
pub async fn run(state: AppState, shutdown: watch::Receiver<bool>) {
    let concurrency = state.config.executor_concurrency;
    tracing::info!(concurrency, "Executor running");

    let mut workers = Vec::new();
    for number in 0..concurrency {
        let state = state.clone();
        let shutdown = shutdown.clone();
        workers.push(tokio::spawn(worker_loop(number, state, shutdown)));
    }

    state.diagnostics.set_executors_running(concurrency);
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "Executor worker panicked");
        }
    }
    state.diagnostics.set_executors_running(0);

    tracing::info!("Executor finishing");
}

async fn worker_loop(number: usize, state: AppState, mut shutdown: watch::Receiver<bool>) {
    tracing::info!(worker = number, "Executor worker running");

    while !*shutdown.borrow() {
        if let Err(e) = state.registry.wait_monitors_ready().await {
            tracing::error!(worker = number, error = %e, "Monitors not ready");
            tokio::time::sleep(Duration::from_secs(state.config.executor_sleep)).await;
            continue;
        }

        let wait = Duration::from_secs(state.config.queue_wait_time());
        let message = tokio::select! {
            received = state.queue.receive(wait) => received,
            _ = shutdown.changed() => break,
        };

        match message {
            Ok(Some(message)) => {
                state.diagnostics.message_received();
                process_message(&state, message).await;
            }
            Ok(None) => {
                tokio::time::sleep(Duration::from_secs(state.config.executor_sleep)).await;
            }
            Err(e) => {
                tracing::error!(worker = number, error = %e, "Queue receive failed");
                tokio::time::sleep(Duration::from_secs(state.config.executor_sleep)).await;
            }
        }
    }

    tracing::info!(worker = number, "Executor worker finishing");
}

/// Dispatch one message under its kind's timeout, with a sibling
/// heartbeat task renewing the queue lease (and the monitor heartbeat
/// once a run token exists).
///
/// Errors and timeouts are logged, counted, and acked: monitor work is
/// re-scheduled by the Controller, reactions and requests are
/// best-effort.
async fn process_message(state: &AppState, message: Message) {
    let kind_label = message.kind.to_string();
    metrics::inc_with(&metrics::EXECUTOR_MESSAGES, &[kind_label.as_str()]);
    metrics::gauge_add(&metrics::EXECUTOR_MESSAGES_PROCESSING, 1.0);
    tracing::info!(kind = %kind_label, "Got message");

    let run_token: Arc<Mutex<Option<RunToken>>> = Arc::new(Mutex::new(None));
    let heartbeat = spawn_heartbeat(state, message.clone(), run_token.clone());

    let timeout = match message.kind {
        MessageKind::Monitor => state.config.executor_monitor_timeout,
        MessageKind::Event => state.config.executor_reaction_timeout,
        MessageKind::Request => state.config.executor_request_timeout,
    };

    let handled = tokio::time::timeout(Duration::from_secs(timeout), async {
        match message.kind {
            MessageKind::Monitor => {
                monitor_handler::run(state, message.payload.clone(), run_token.clone()).await
            }
            MessageKind::Event => reaction_handler::run(state, message.payload.clone()).await,
            MessageKind::Request => request_handler::run(state, message.payload.clone()).await,
        }
    })
    .await;

    match handled {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            metrics::inc_with(&metrics::EXECUTOR_MESSAGE_ERRORS, &[kind_label.as_str()]);
            tracing::error!(kind = %kind_label, error = %e, "Message handler failed");
        }
        Err(_) => {
            metrics::inc_with(&metrics::EXECUTOR_MESSAGE_ERRORS, &[kind_label.as_str()]);
            tracing::error!(kind = %kind_label, timeout, "Message handler timed out");
            // A timed-out monitor handler left the run open; release it
            // so the monitor can be scheduled again.
            let token = run_token
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            if let Some(token) = token {
                release_timed_out_run(state, &token).await;
            }
        }
    }

    heartbeat.abort();
    if let Err(e) = state.queue.ack(&message).await {
        tracing::error!(error = %e, "Failed to ack message");
    }
    metrics::gauge_add(&metrics::EXECUTOR_MESSAGES_PROCESSING, -1.0);
}

async fn release_timed_out_run(state: &AppState, token: &RunToken) {
    use sentinela_common::types::{RunKind, RunOutcome};

    let monitor_name = state
        .registry
        .get(token.monitor_id)
        .map(|loaded| loaded.name.clone())
        .unwrap_or_else(|| token.monitor_id.to_string());
    metrics::inc_with(&metrics::MONITOR_EXECUTION_TIMEOUTS, &[monitor_name.as_str()]);

    let tasks: &[RunKind] = &[];
    if let Err(e) = state
        .store
        .end_run(token, tasks, RunOutcome::Timeout, Some("dispatch timeout".to_string()))
        .await
    {
        tracing::error!(monitor_id = token.monitor_id, error = %e, "Failed to end timed-out run");
    }
}

/// Sibling task renewing the message visibility lease every heartbeat
/// interval, plus the monitor row heartbeat for monitor messages.
fn spawn_heartbeat(
    state: &AppState,
    message: Message,
    run_token: Arc<Mutex<Option<RunToken>>>,
) -> JoinHandle<()> {
    let state = state.clone();
    tokio::spawn(async move {
        let heartbeat_time = Duration::from_secs(state.config.executor_monitor_heartbeat_time);
        let visibility = Duration::from_secs(state.config.queue_visibility_time());
        let mut tick = tokio::time::interval(heartbeat_time);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so the initial
        // lease from receive() stands.
        tick.tick().await;

        loop {
            tick.tick().await;
            if let Err(e) = state.queue.extend_visibility(&message, visibility).await {
                tracing::warn!(error = %e, "Failed to extend message visibility");
            }
            let token = *run_token
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(token) = token {
                if let Err(e) = state.store.heartbeat(&token, Utc::now()).await {
                    tracing::warn!(
                        monitor_id = token.monitor_id,
                        error = %e,
                        "Failed to heartbeat run"
                    );
                }
            }
        }
    })
}
