use crate::metrics;
use crate::state::AppState;
use sentinela_common::types::EventPayload;
use std::time::Duration;

/// Process an `event` message: run every reaction bound to the event
/// name on the source monitor. Each callback gets its own timeout;
/// reaction failures are logged and counted but emit no new events.
pub async fn run(state: &AppState, payload: serde_json::Value) -> anyhow::Result<()> {
    let event: EventPayload = match serde_json::from_value(payload) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(error = %e, "Invalid event message payload");
            return Ok(());
        }
    };
    let monitor_id = event.event_source_monitor_id;
    let event_name = event.event_name.clone();

    if state.registry.wait_monitor_loaded(monitor_id).await.is_err() {
        metrics::inc(&metrics::MONITOR_NOT_REGISTERED);
        tracing::error!(monitor_id, event_name, "Monitor not registered, skipping event");
        return Ok(());
    }
    let Some(loaded) = state.registry.get(monitor_id) else {
        metrics::inc(&metrics::MONITOR_NOT_REGISTERED);
        return Ok(());
    };

    let timeout = Duration::from_secs(state.config.executor_reaction_timeout);
    for (index, reaction) in loaded.reactions.get(&event_name).iter().enumerate() {
        tracing::info!(
            monitor = %loaded.name,
            event_name,
            reaction = index,
            "Executing reaction"
        );

        match tokio::time::timeout(timeout, reaction(event.clone())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                metrics::inc_with(&metrics::REACTION_ERRORS, &[loaded.name.as_str(), event_name.as_str()]);
                tracing::error!(
                    monitor = %loaded.name,
                    event_name,
                    reaction = index,
                    error = %e,
                    "Error executing reaction"
                );
            }
            Err(_) => {
                metrics::inc_with(&metrics::REACTION_TIMEOUTS, &[loaded.name.as_str(), event_name.as_str()]);
                tracing::error!(
                    monitor = %loaded.name,
                    event_name,
                    reaction = index,
                    "Timed out executing reaction"
                );
            }
        }
    }
    Ok(())
}
