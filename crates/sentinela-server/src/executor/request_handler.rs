use crate::metrics;
use crate::state::AppState;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RequestMessage {
    action: String,
    #[serde(default)]
    params: serde_json::Value,
}

/// Process a `request` message: dispatch the named action. Built-in
/// actions map one-to-one to store operations; `plugin.`-prefixed
/// actions route to the plugin action registries. Unknown actions are
/// logged and dropped.
pub async fn run(state: &AppState, payload: serde_json::Value) -> anyhow::Result<()> {
    let message: RequestMessage = match serde_json::from_value(payload) {
        Ok(message) => message,
        Err(e) => {
            tracing::error!(error = %e, "Invalid request message payload");
            return Ok(());
        }
    };

    let result = dispatch(state, &message).await;
    if let Err(e) = result {
        metrics::inc(&metrics::REQUEST_ERRORS);
        tracing::error!(action = %message.action, error = %e, "Error executing request");
    }
    Ok(())
}

async fn dispatch(state: &AppState, message: &RequestMessage) -> anyhow::Result<()> {
    match message.action.as_str() {
        "alert_acknowledge" => alert_acknowledge(state, &message.params).await,
        "alert_lock" => alert_lock(state, &message.params).await,
        "alert_unlock" => alert_unlock(state, &message.params).await,
        "alert_solve" => alert_solve(state, &message.params).await,
        "issue_drop" => issue_drop(state, &message.params).await,
        "monitor_enable" => set_monitor_enabled(state, &message.params, true).await,
        "monitor_disable" => set_monitor_enabled(state, &message.params, false).await,
        "monitor_register" => monitor_register(state, &message.params).await,
        action if action.starts_with("plugin.") => plugin_action(state, message).await,
        action => {
            tracing::warn!(action, "Got request with unknown action");
            Ok(())
        }
    }
}

fn param_i64(params: &serde_json::Value, key: &str) -> anyhow::Result<i64> {
    params
        .get(key)
        .and_then(|value| value.as_i64())
        .ok_or_else(|| anyhow::anyhow!("request params missing '{key}'"))
}

fn param_str<'a>(params: &'a serde_json::Value, key: &str) -> anyhow::Result<&'a str> {
    params
        .get(key)
        .and_then(|value| value.as_str())
        .ok_or_else(|| anyhow::anyhow!("request params missing '{key}'"))
}

async fn alert_acknowledge(state: &AppState, params: &serde_json::Value) -> anyhow::Result<()> {
    let alert_id = param_i64(params, "alert_id")?;
    let Some(alert) = state.store.get_alert(alert_id).await? else {
        tracing::info!(alert_id, "Alert not found");
        return Ok(());
    };
    state
        .registry
        .wait_monitor_loaded(alert.monitor_id)
        .await?;
    state.store.acknowledge_alert(alert_id).await?;
    Ok(())
}

async fn alert_lock(state: &AppState, params: &serde_json::Value) -> anyhow::Result<()> {
    let alert_id = param_i64(params, "alert_id")?;
    let Some(alert) = state.store.get_alert(alert_id).await? else {
        tracing::info!(alert_id, "Alert not found");
        return Ok(());
    };
    state
        .registry
        .wait_monitor_loaded(alert.monitor_id)
        .await?;
    state.store.lock_alert(alert_id).await?;
    Ok(())
}

async fn alert_unlock(state: &AppState, params: &serde_json::Value) -> anyhow::Result<()> {
    let alert_id = param_i64(params, "alert_id")?;
    let Some(alert) = state.store.get_alert(alert_id).await? else {
        tracing::info!(alert_id, "Alert not found");
        return Ok(());
    };
    state
        .registry
        .wait_monitor_loaded(alert.monitor_id)
        .await?;
    state.store.unlock_alert(alert_id).await?;
    Ok(())
}

/// Solve all the alert's issues. The monitor's issue options decide
/// whether the manual solve is allowed at all.
async fn alert_solve(state: &AppState, params: &serde_json::Value) -> anyhow::Result<()> {
    let alert_id = param_i64(params, "alert_id")?;
    let Some(alert) = state.store.get_alert(alert_id).await? else {
        tracing::info!(alert_id, "Alert not found");
        return Ok(());
    };
    state
        .registry
        .wait_monitor_loaded(alert.monitor_id)
        .await?;

    let solvable = state
        .registry
        .get(alert.monitor_id)
        .map(|loaded| loaded.definition.issue_options.solvable)
        .unwrap_or(true);
    state.store.solve_alert(alert_id, solvable).await?;
    Ok(())
}

async fn issue_drop(state: &AppState, params: &serde_json::Value) -> anyhow::Result<()> {
    let issue_id = param_i64(params, "issue_id")?;
    let Some(issue) = state.store.get_issue(issue_id).await? else {
        tracing::info!(issue_id, "Issue not found");
        return Ok(());
    };
    state
        .registry
        .wait_monitor_loaded(issue.monitor_id)
        .await?;
    state.store.mark_issue_dropped(issue_id).await?;
    Ok(())
}

async fn set_monitor_enabled(
    state: &AppState,
    params: &serde_json::Value,
    enabled: bool,
) -> anyhow::Result<()> {
    let monitor_name = param_str(params, "monitor_name")?;
    let Some(monitor) = state.store.get_monitor_by_name(monitor_name).await? else {
        anyhow::bail!("monitor '{monitor_name}' not found");
    };
    state.store.set_monitor_enabled(monitor.id, enabled).await?;
    state.registry.request_reload();
    Ok(())
}

/// Re-register a monitor from the catalog.
async fn monitor_register(state: &AppState, params: &serde_json::Value) -> anyhow::Result<()> {
    let monitor_name = param_str(params, "monitor_name")?;
    let Some(definition) = state.catalog.get(monitor_name) else {
        anyhow::bail!("monitor '{monitor_name}' is not in the catalog");
    };
    sentinela_registry::validate::check_definition(monitor_name, &definition)?;
    state
        .store
        .register_monitor(monitor_name, &definition.source, &definition.version_hash())
        .await?;
    state.registry.request_reload();
    Ok(())
}

/// Route `plugin.<name>.<action>` to the plugin action registries.
async fn plugin_action(state: &AppState, message: &RequestMessage) -> anyhow::Result<()> {
    let mut parts = message.action.splitn(3, '.');
    let _prefix = parts.next();
    let (Some(plugin), Some(action)) = (parts.next(), parts.next()) else {
        anyhow::bail!("malformed plugin action '{}'", message.action);
    };

    let Some(callback) = state.plugin_actions.get(plugin, action) else {
        tracing::warn!(plugin, action, "Unknown plugin action");
        return Ok(());
    };
    callback(message.params.clone()).await
}
