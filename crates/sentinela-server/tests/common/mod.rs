use async_trait::async_trait;
use chrono::Utc;
use sentinela_common::types::RunKind;
use sentinela_common::value::IssueData;
use sentinela_notify::{ChannelRegistry, NotificationManager};
use sentinela_queue::internal::InternalQueue;
use sentinela_registry::{
    DefinitionCatalog, IssueOptions, MonitorCode, MonitorContext, MonitorDefinition,
    MonitorOptions, Registry,
};
use sentinela_server::config::Config;
use sentinela_server::state::{AppState, Diagnostics, PluginActions, RegistryReactions};
use sentinela_server::{executor, loader};
use sentinela_storage::pools::PoolConfig;
use sentinela_storage::{QueryPools, Store, StoreSettings};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Engine wired over a temp sqlite store and the in-process queue, with
/// every event persisted for assertions.
pub struct TestHarness {
    _dir: TempDir,
    pub state: AppState,
    pub queue: Arc<InternalQueue>,
}

pub async fn harness(catalog: DefinitionCatalog) -> TestHarness {
    let dir = TempDir::new().unwrap();
    let db_url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("sentinela.db").display()
    );

    let config = Config::empty().unwrap();
    let registry = Arc::new(Registry::new());

    let store = Arc::new(
        Store::connect(
            &db_url,
            StoreSettings::default(),
            Arc::new(RegistryReactions(registry.clone())),
            true,
        )
        .await
        .unwrap(),
    );

    let mut pools = QueryPools::empty();
    pools
        .connect("application", &db_url, &PoolConfig::default())
        .await
        .unwrap();
    let pools = Arc::new(pools);

    let queue = Arc::new(InternalQueue::new(1_000, Duration::from_secs(60)));
    let notifier = Arc::new(NotificationManager::new(
        store.clone(),
        ChannelRegistry::default(),
    ));

    let state = AppState {
        config: Arc::new(config),
        time_zone: chrono_tz::UTC,
        store,
        queue: queue.clone(),
        registry,
        catalog: Arc::new(catalog),
        notifier,
        pools,
        plugin_actions: Arc::new(PluginActions::default()),
        diagnostics: Arc::new(Diagnostics::default()),
        started_at: Utc::now(),
        controller_enabled: true,
        executor_enabled: true,
    };

    loader::register_catalog_monitors(&state).await.unwrap();
    loader::load_monitors(&state).await.unwrap();

    TestHarness {
        _dir: dir,
        state,
        queue,
    }
}

/// Claim the monitor and run the given routines the way the executor's
/// monitor handler would.
pub async fn run_monitor(harness: &TestHarness, monitor_id: i64, tasks: &[RunKind]) {
    assert!(harness
        .state
        .store
        .claim_monitor_for_run(monitor_id)
        .await
        .unwrap());

    let payload = serde_json::json!({ "monitor_id": monitor_id, "tasks": tasks });
    let token = Arc::new(Mutex::new(None));
    executor::monitor_handler::run(&harness.state, payload, token)
        .await
        .unwrap();
}

/// Scripted monitor code: search pops pre-programmed batches, update
/// applies a per-entry override, and `is_solved` reads the `solved`
/// field.
pub struct ScriptedMonitor {
    pub search_batches: Mutex<Vec<Vec<IssueData>>>,
    pub update_overrides: Mutex<Vec<Vec<IssueData>>>,
    pub search_delay: Option<Duration>,
}

impl ScriptedMonitor {
    pub fn new() -> Self {
        Self {
            search_batches: Mutex::new(Vec::new()),
            update_overrides: Mutex::new(Vec::new()),
            search_delay: None,
        }
    }

    pub fn push_search(&self, batch: Vec<serde_json::Value>) {
        let batch = batch
            .into_iter()
            .filter_map(|value| value.as_object().cloned())
            .collect();
        self.search_batches.lock().unwrap().insert(0, batch);
    }

    pub fn push_update(&self, batch: Vec<serde_json::Value>) {
        let batch = batch
            .into_iter()
            .filter_map(|value| value.as_object().cloned())
            .collect();
        self.update_overrides.lock().unwrap().insert(0, batch);
    }
}

#[async_trait]
impl MonitorCode for ScriptedMonitor {
    async fn search(&self, _ctx: &MonitorContext) -> anyhow::Result<Option<Vec<IssueData>>> {
        if let Some(delay) = self.search_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.search_batches.lock().unwrap().pop())
    }

    async fn update(
        &self,
        _ctx: &MonitorContext,
        issues_data: Vec<IssueData>,
    ) -> anyhow::Result<Option<Vec<IssueData>>> {
        let Some(overrides) = self.update_overrides.lock().unwrap().pop() else {
            return Ok(Some(issues_data));
        };
        Ok(Some(overrides))
    }

    fn is_solved(&self, issue_data: &IssueData) -> anyhow::Result<bool> {
        Ok(issue_data
            .get("solved")
            .and_then(|value| value.as_bool())
            .unwrap_or(false))
    }
}

/// Definition around a scripted monitor with the standard test options.
pub fn scripted_definition(
    code: Arc<ScriptedMonitor>,
    issue_options: IssueOptions,
    alert_options: Option<sentinela_registry::AlertOptions>,
) -> MonitorDefinition {
    MonitorDefinition {
        monitor_options: MonitorOptions {
            search_cron: Some("* * * * *".to_string()),
            update_cron: Some("* * * * *".to_string()),
            max_issues_creation: None,
            execution_timeout: None,
        },
        issue_options,
        alert_options,
        reaction_options: sentinela_registry::ReactionOptions::new(),
        notification_options: Vec::new(),
        code,
        source: "test://scripted".to_string(),
    }
}
