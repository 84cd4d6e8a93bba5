//! Monitor definitions and the live catalogue of loaded monitors.
//!
//! Monitors are compiled routines registered through a plugin
//! interface: a [`MonitorDefinition`] bundles the option value objects
//! with an [`MonitorCode`] vtable. The [`catalog::DefinitionCatalog`]
//! holds everything this process can run; the [`registry::Registry`]
//! holds what is currently loaded (enabled monitors with their store
//! ids) and is atomically replaced by the loader.

pub mod catalog;
pub mod options;
pub mod registry;
pub mod validate;


pub use catalog::DefinitionCatalog;
pub use options::{
    AlertOptions, IssueOptions, MonitorDefinition, MonitorOptions, NotificationSpec,
    ReactionFn, ReactionOptions,
};
pub use registry::{LoadedMonitor, Registry};
pub use validate::{validate_definition, ValidationError};

use async_trait::async_trait;
use sentinela_common::value::IssueData;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("waiting for monitors to be ready timed out")]
    LoadTimeout,

    #[error("monitor '{0}' not registered")]
    NotRegistered(i64),
}

/// Per-monitor key/value blobs, reachable only from the owning
/// monitor's callbacks.
#[async_trait]
pub trait VariableAccess: Send + Sync {
    async fn get_variable(&self, monitor_id: i64, name: &str) -> anyhow::Result<Option<String>>;
    async fn set_variable(
        &self,
        monitor_id: i64,
        name: &str,
        value: Option<String>,
    ) -> anyhow::Result<()>;
}

/// Named SQL pools exposed to monitor callbacks (the `query` facility).
#[async_trait]
pub trait QueryAccess: Send + Sync {
    async fn query(&self, pool: &str, sql: &str) -> anyhow::Result<Vec<serde_json::Value>>;
}

/// Capabilities handed to every monitor callback invocation.
pub struct MonitorContext {
    pub monitor_id: i64,
    pub monitor_name: String,
    variables: Arc<dyn VariableAccess>,
    queries: Arc<dyn QueryAccess>,
}

impl MonitorContext {
    pub fn new(
        monitor_id: i64,
        monitor_name: String,
        variables: Arc<dyn VariableAccess>,
        queries: Arc<dyn QueryAccess>,
    ) -> Self {
        Self {
            monitor_id,
            monitor_name,
            variables,
            queries,
        }
    }

    pub async fn get_variable(&self, name: &str) -> anyhow::Result<Option<String>> {
        self.variables.get_variable(self.monitor_id, name).await
    }

    pub async fn set_variable(&self, name: &str, value: Option<String>) -> anyhow::Result<()> {
        self.variables
            .set_variable(self.monitor_id, name, value)
            .await
    }

    /// Run a query against one of the `DATABASE_<NAME>` pools.
    pub async fn query(&self, pool: &str, sql: &str) -> anyhow::Result<Vec<serde_json::Value>> {
        self.queries.query(pool, sql).await
    }
}

/// Off-load blocking work from a monitor callback onto a worker
/// thread. Callbacks run on the cooperative scheduler and must not
/// block it directly.
pub async fn run_blocking<F, T>(work: F) -> anyhow::Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(work).await?)
}

/// The compiled callbacks of a monitor.
///
/// `search` finds current problem instances; `update` refreshes the
/// payloads of active issues; `is_solved` decides whether a payload
/// still describes a problem. `is_solved` is never invoked when the
/// monitor's issues are not solvable, so non-solvable monitors keep the
/// default.
#[async_trait]
pub trait MonitorCode: Send + Sync {
    /// Find current problem instances. `None` and an empty list both
    /// mean nothing was found.
    async fn search(&self, ctx: &MonitorContext) -> anyhow::Result<Option<Vec<IssueData>>>;

    /// Refresh the payloads of the given active issues. Entries are
    /// matched back by the monitor's `model_id_key`; `None` means no
    /// changes.
    async fn update(
        &self,
        ctx: &MonitorContext,
        issues_data: Vec<IssueData>,
    ) -> anyhow::Result<Option<Vec<IssueData>>>;

    /// Whether the payload no longer describes a problem.
    fn is_solved(&self, issue_data: &IssueData) -> anyhow::Result<bool> {
        let _ = issue_data;
        Ok(false)
    }
}
