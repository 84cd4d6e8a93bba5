use crate::config::Config;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sentinela_notify::NotificationManager;
use sentinela_queue::WorkQueue;
use sentinela_registry::{DefinitionCatalog, QueryAccess, Registry, VariableAccess};
use sentinela_storage::{QueryPools, ReactionLookup, Store};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Liveness timestamps reported by `GET /status`.
#[derive(Debug, Default)]
pub struct Diagnostics {
    inner: Mutex<DiagnosticsInner>,
}

#[derive(Debug, Default, Clone)]
struct DiagnosticsInner {
    pub controller_last_loop_at: Option<DateTime<Utc>>,
    pub last_monitor_processed_at: Option<DateTime<Utc>>,
    pub executor_last_message_at: Option<DateTime<Utc>>,
    pub executors_running: usize,
}

impl Diagnostics {
    pub fn controller_looped(&self) {
        self.lock().controller_last_loop_at = Some(Utc::now());
    }

    pub fn monitor_processed(&self) {
        self.lock().last_monitor_processed_at = Some(Utc::now());
    }

    pub fn message_received(&self) {
        self.lock().executor_last_message_at = Some(Utc::now());
    }

    pub fn set_executors_running(&self, count: usize) {
        self.lock().executors_running = count;
    }

    /// (status fields, degradation issues) for the status endpoint.
    pub fn report(
        &self,
        started_at: DateTime<Utc>,
        executor_concurrency: usize,
    ) -> (serde_json::Value, Vec<String>) {
        let inner = self.lock().clone();
        let now = Utc::now();
        let mut issues = Vec::new();

        let warmed_up = (now - started_at).num_seconds() >= 60;
        let stale = |at: Option<DateTime<Utc>>| match at {
            Some(at) => (now - at).num_seconds() > 300,
            None => true,
        };

        if warmed_up {
            if stale(inner.controller_last_loop_at) {
                issues.push("loop_not_running".to_string());
            }
            if stale(inner.executor_last_message_at) {
                issues.push("no_recent_messages".to_string());
            }
        }
        if inner.executors_running < executor_concurrency {
            issues.push("degraded_internal_executors".to_string());
        }

        let status = serde_json::json!({
            "controller_last_loop_at": inner.controller_last_loop_at,
            "last_monitor_processed_at": inner.last_monitor_processed_at,
            "executor_last_message_at": inner.executor_last_message_at,
            "executors_running": inner.executors_running,
        });
        (status, issues)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DiagnosticsInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Actions contributed by plugins, addressed as
/// `plugin.<name>.<action>` in request messages.
pub type PluginActionFn =
    Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Default)]
pub struct PluginActions {
    actions: Mutex<HashMap<String, PluginActionFn>>,
}

impl PluginActions {
    pub fn register(&self, plugin: &str, action: &str, callback: PluginActionFn) {
        self.actions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(format!("{plugin}.{action}"), callback);
    }

    pub fn get(&self, plugin: &str, action: &str) -> Option<PluginActionFn> {
        self.actions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&format!("{plugin}.{action}"))
            .cloned()
    }
}

/// Shared handles for every engine component.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub time_zone: chrono_tz::Tz,
    pub store: Arc<Store>,
    pub queue: Arc<dyn WorkQueue>,
    pub registry: Arc<Registry>,
    pub catalog: Arc<DefinitionCatalog>,
    pub notifier: Arc<NotificationManager>,
    pub pools: Arc<QueryPools>,
    pub plugin_actions: Arc<PluginActions>,
    pub diagnostics: Arc<Diagnostics>,
    pub started_at: DateTime<Utc>,
    pub controller_enabled: bool,
    pub executor_enabled: bool,
}

/// Store-side reaction lookup backed by the registry.
pub struct RegistryReactions(pub Arc<Registry>);

impl ReactionLookup for RegistryReactions {
    fn has_reaction(&self, monitor_id: i64, event_name: &str) -> bool {
        self.0.has_reaction(monitor_id, event_name)
    }
}

/// Variable access for monitor callbacks, backed by the store.
pub struct StoreVariables(pub Arc<Store>);

#[async_trait]
impl VariableAccess for StoreVariables {
    async fn get_variable(&self, monitor_id: i64, name: &str) -> anyhow::Result<Option<String>> {
        Ok(self.0.get_variable(monitor_id, name).await?)
    }

    async fn set_variable(
        &self,
        monitor_id: i64,
        name: &str,
        value: Option<String>,
    ) -> anyhow::Result<()> {
        Ok(self.0.set_variable(monitor_id, name, value).await?)
    }
}

/// Query facility for monitor callbacks, backed by the named pools.
pub struct PoolQueries(pub Arc<QueryPools>);

#[async_trait]
impl QueryAccess for PoolQueries {
    async fn query(&self, pool: &str, sql: &str) -> anyhow::Result<Vec<serde_json::Value>> {
        Ok(self.0.query(pool, sql).await?)
    }
}

impl AppState {
    /// Context handed to a monitor's callbacks.
    pub fn monitor_context(
        &self,
        monitor_id: i64,
        monitor_name: &str,
    ) -> sentinela_registry::MonitorContext {
        sentinela_registry::MonitorContext::new(
            monitor_id,
            monitor_name.to_string(),
            Arc::new(StoreVariables(self.store.clone())),
            Arc::new(PoolQueries(self.pools.clone())),
        )
    }
}
