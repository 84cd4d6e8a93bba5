use crate::state::AppState;
use sentinela_common::time::{parse_cron, time_until_next_trigger};
use sentinela_registry::validate::check_definition;
use sentinela_registry::LoadedMonitor;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Start loading slightly before the controller/executor schedules
/// fire so a fresh map is ready for them.
const EARLY_LOAD_TIME: Duration = Duration::from_secs(2);
/// Floor between consecutive load passes.
const COOL_DOWN_TIME: Duration = Duration::from_secs(2);

/// Insert a store row for every catalog definition. Only the process
/// that elected the Controller role runs this, so internal and sample
/// monitors are not registered concurrently from every replica.
pub async fn register_catalog_monitors(state: &AppState) -> anyhow::Result<()> {
    for (name, definition) in state.catalog.iter() {
        if let Err(e) = check_definition(name, definition) {
            tracing::warn!(monitor = %name, error = %e, "Skipping invalid catalog definition");
            continue;
        }
        state
            .store
            .register_monitor(name, &definition.source, &definition.version_hash())
            .await?;
    }
    Ok(())
}

/// One load pass: attach catalog definitions to the enabled monitor
/// rows and swap the registry map.
pub async fn load_monitors(state: &AppState) -> anyhow::Result<()> {
    state.registry.begin_load();

    let rows = state.store.list_enabled_monitors().await?;
    tracing::info!(count = rows.len(), "Monitors found");

    let mut monitors = HashMap::new();
    for row in rows {
        let Some(definition) = state.catalog.get(&row.name) else {
            tracing::warn!(
                monitor = %row.name,
                id = row.id,
                "Monitor has no catalog definition, skipping"
            );
            continue;
        };

        // Notification specs expand into alert lifecycle reactions at
        // load time.
        let mut reactions = definition.reaction_options.clone();
        for spec in &definition.notification_options {
            reactions.extend(&state.notifier.reactions_for(spec));
        }

        monitors.insert(
            row.id,
            Arc::new(LoadedMonitor {
                id: row.id,
                name: row.name.clone(),
                definition,
                reactions,
            }),
        );
    }

    state.registry.swap(monitors);
    Ok(())
}

/// Monitors loading loop: reload on the configured schedule, waking
/// early when a consumer misses a monitor.
pub async fn run(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let schedule = match parse_cron(&state.config.monitors_load_schedule) {
        Ok(schedule) => schedule,
        Err(e) => {
            tracing::error!(error = %e, "Invalid monitors_load_schedule, loader not running");
            return;
        }
    };

    tracing::info!("Monitors loader running");

    while !*shutdown.borrow() {
        if let Err(e) = load_monitors(&state).await {
            tracing::error!(error = %e, "Monitors load pass failed");
        }

        let until_next =
            time_until_next_trigger(&schedule, state.time_zone, chrono::Utc::now());
        let sleep_time = Duration::from_secs(until_next)
            .saturating_sub(EARLY_LOAD_TIME)
            .max(COOL_DOWN_TIME);

        tokio::select! {
            _ = tokio::time::sleep(sleep_time) => {}
            _ = state.registry.reload_requested() => {
                tracing::info!("Early monitors reload requested");
                // Keep a floor between passes even when consumers keep
                // asking.
                tokio::time::sleep(COOL_DOWN_TIME).await;
            }
            _ = shutdown.changed() => {}
        }
    }

    tracing::info!("Monitors loader finishing");
}
