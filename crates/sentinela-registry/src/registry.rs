use crate::options::{MonitorDefinition, ReactionOptions};
use crate::RegistryError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// How long consumers wait for a load pass before giving up.
const MONITORS_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// A monitor currently loaded for execution: its store identity, its
/// definition, and the effective reactions (definition reactions plus
/// the ones expanded from notification specs at load time).
pub struct LoadedMonitor {
    pub id: i64,
    pub name: String,
    pub definition: Arc<MonitorDefinition>,
    pub reactions: ReactionOptions,
}

/// Read-mostly map of loaded monitors with atomic replacement.
///
/// The loader builds a fresh map and swaps it in; readers never see a
/// partially loaded state. Consumers that miss a monitor signal a
/// reload and wait for the next swap.
pub struct Registry {
    monitors: RwLock<HashMap<i64, Arc<LoadedMonitor>>>,
    ready_tx: watch::Sender<bool>,
    reload_requested: Notify,
}

impl Registry {
    pub fn new() -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            monitors: RwLock::new(HashMap::new()),
            ready_tx,
            reload_requested: Notify::new(),
        }
    }

    pub fn get(&self, monitor_id: i64) -> Option<Arc<LoadedMonitor>> {
        self.monitors
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&monitor_id)
            .cloned()
    }

    pub fn is_registered(&self, monitor_id: i64) -> bool {
        self.monitors
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(&monitor_id)
    }

    pub fn monitors(&self) -> Vec<Arc<LoadedMonitor>> {
        let mut monitors: Vec<Arc<LoadedMonitor>> = self
            .monitors
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        monitors.sort_by_key(|monitor| monitor.id);
        monitors
    }

    pub fn len(&self) -> usize {
        self.monitors
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a reaction is bound to (monitor, event_name). The store
    /// consults this when deciding which events to persist.
    pub fn has_reaction(&self, monitor_id: i64, event_name: &str) -> bool {
        self.get(monitor_id)
            .is_some_and(|monitor| monitor.reactions.has(event_name))
    }

    /// Mark the registry not ready; called when a load pass starts.
    pub fn begin_load(&self) {
        self.ready_tx.send_replace(false);
    }

    /// Replace the whole map and mark the registry ready.
    pub fn swap(&self, monitors: HashMap<i64, Arc<LoadedMonitor>>) {
        let count = monitors.len();
        {
            let mut guard = self
                .monitors
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = monitors;
        }
        self.ready_tx.send_replace(true);
        tracing::info!(count, "Monitors registry swapped");
    }

    /// Wait for the registry to be ready, bounded by a short timeout.
    pub async fn wait_monitors_ready(&self) -> Result<(), RegistryError> {
        let mut ready_rx = self.ready_tx.subscribe();
        let wait = async {
            loop {
                if *ready_rx.borrow_and_update() {
                    return;
                }
                if ready_rx.changed().await.is_err() {
                    return;
                }
            }
        };
        tokio::time::timeout(MONITORS_READY_TIMEOUT, wait)
            .await
            .map_err(|_| RegistryError::LoadTimeout)
    }

    /// Wait for a monitor to be loaded, signalling the loader to run
    /// early when it is missing.
    pub async fn wait_monitor_loaded(&self, monitor_id: i64) -> Result<(), RegistryError> {
        if self.is_registered(monitor_id) {
            return Ok(());
        }

        self.request_reload();
        self.wait_monitors_ready().await?;

        if !self.is_registered(monitor_id) {
            return Err(RegistryError::NotRegistered(monitor_id));
        }
        Ok(())
    }

    /// Ask the loader to run before its next scheduled tick.
    pub fn request_reload(&self) {
        self.ready_tx.send_replace(false);
        self.reload_requested.notify_one();
    }

    /// Loader side: wake on the next reload request.
    pub async fn reload_requested(&self) {
        self.reload_requested.notified().await;
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
