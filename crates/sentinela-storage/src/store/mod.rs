use crate::error::Result;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use std::time::Duration;

pub mod alert;
pub mod event;
pub mod issue;
pub mod monitor;
pub mod notification;
pub mod variable;

pub use alert::AlertRow;
pub use event::EventRow;
pub use issue::IssueRow;
pub use monitor::{MonitorExecutionRow, MonitorRow};
pub use notification::NotificationRow;

/// Answers whether a reaction is registered for (monitor, event_name).
/// The registry implements this; the store uses it to decide which
/// events must be persisted for publication.
pub trait ReactionLookup: Send + Sync {
    fn has_reaction(&self, monitor_id: i64, event_name: &str) -> bool;
}

/// Lookup that never finds a reaction. Useful before the registry is
/// wired up and in tests exercising pure state transitions.
pub struct NoReactions;

impl ReactionLookup for NoReactions {
    fn has_reaction(&self, _monitor_id: i64, _event_name: &str) -> bool {
        false
    }
}

/// Connection pool settings for the application store.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub pool_size: u32,
    pub acquire_timeout: Duration,
    pub query_timeout: Duration,
    pub log_query_metrics: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            pool_size: 10,
            acquire_timeout: Duration::from_secs(10),
            query_timeout: Duration::from_secs(30),
            log_query_metrics: false,
        }
    }
}

/// Transactional access layer over the application database.
///
/// Every state-transition method is a single transaction and appends
/// the lifecycle events it produces within that transaction. Events are
/// persisted when a reaction is registered for them (flagged for the
/// outbox publisher) or when `log_all_events` is set.
pub struct Store {
    pub(crate) db: DatabaseConnection,
    pub(crate) reactions: Arc<dyn ReactionLookup>,
    pub(crate) log_all_events: bool,
}

impl Store {
    /// Connect to the application database and run pending migrations.
    pub async fn connect(
        url: &str,
        settings: StoreSettings,
        reactions: Arc<dyn ReactionLookup>,
        log_all_events: bool,
    ) -> Result<Self> {
        let mut options = ConnectOptions::new(url.to_string());
        options
            .max_connections(settings.pool_size)
            .acquire_timeout(settings.acquire_timeout)
            .connect_timeout(settings.acquire_timeout)
            .idle_timeout(settings.query_timeout)
            .sqlx_logging(settings.log_query_metrics);

        let db = Database::connect(options).await?;
        Migrator::up(&db, None).await?;

        tracing::info!("Application store initialized");

        Ok(Self {
            db,
            reactions,
            log_all_events,
        })
    }

    /// Swap the reaction lookup (wired once the registry exists).
    pub fn with_reactions(mut self, reactions: Arc<dyn ReactionLookup>) -> Self {
        self.reactions = reactions;
        self
    }

    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Close the underlying pool, waiting for checked-out connections.
    pub async fn close(&self) -> Result<()> {
        self.db.clone().close().await?;
        Ok(())
    }
}
