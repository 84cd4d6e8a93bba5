use crate::metrics;
use crate::state::AppState;
use sentinela_queue::MessageKind;
use std::time::Duration;
use tokio::sync::watch;

const FLUSH_INTERVAL: Duration = Duration::from_secs(1);
const FLUSH_BATCH: u64 = 100;

/// Publish committed events to the queue.
///
/// Events flagged pending were committed with their state transition;
/// enqueueing first and clearing the flag after gives at-least-once
/// delivery across crashes (reactions are idempotent consumers).
pub async fn run(state: AppState, mut shutdown: watch::Receiver<bool>) {
    tracing::info!("Outbox publisher running");

    while !*shutdown.borrow() {
        if let Err(e) = flush(&state).await {
            tracing::error!(error = %e, "Outbox flush failed");
        }

        tokio::select! {
            _ = tokio::time::sleep(FLUSH_INTERVAL) => {}
            _ = shutdown.changed() => {}
        }
    }

    tracing::info!("Outbox publisher finishing");
}

/// Drain one batch of pending events. Stops at the first enqueue
/// failure; the next tick retries from the same place.
pub async fn flush(state: &AppState) -> anyhow::Result<usize> {
    let pending = state.store.pending_events(FLUSH_BATCH).await?;
    let mut published = 0;

    for event in pending {
        match state
            .queue
            .send(MessageKind::Event, event.payload.clone())
            .await
        {
            Ok(()) => {
                state.store.mark_event_published(event.id).await?;
                metrics::inc(&metrics::OUTBOX_EVENTS_PUBLISHED);
                published += 1;
            }
            Err(e) => {
                tracing::warn!(
                    event_id = event.id,
                    event_name = %event.event_name,
                    error = %e,
                    "Failed to enqueue event, will retry"
                );
                break;
            }
        }
    }

    Ok(published)
}
