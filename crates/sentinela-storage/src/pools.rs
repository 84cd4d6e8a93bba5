use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, FromQueryResult, JsonValue,
    Statement,
};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Result, StorageError};

const ENV_PREFIX: &str = "DATABASE_";

/// Named read-mostly pools exposed to monitor callbacks through the
/// `query` facility. Each `DATABASE_<NAME>` environment DSN becomes the
/// pool `<name>` lowercased; `DATABASE_APPLICATION` lands as
/// `application`, which the internal monitors query.
pub struct QueryPools {
    pools: HashMap<String, DatabaseConnection>,
}

/// Per-pool overrides from `databases_pools_configs`.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub pool_size: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 5,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

impl QueryPools {
    pub fn empty() -> Self {
        Self {
            pools: HashMap::new(),
        }
    }

    /// Add a pool under an explicit name.
    pub fn insert(&mut self, name: &str, connection: DatabaseConnection) {
        self.pools.insert(name.to_lowercase(), connection);
    }

    /// Connect a single DSN under an explicit name.
    pub async fn connect(&mut self, name: &str, dsn: &str, config: &PoolConfig) -> Result<()> {
        let mut options = ConnectOptions::new(dsn.to_string());
        options
            .max_connections(config.pool_size)
            .acquire_timeout(config.acquire_timeout)
            .connect_timeout(config.acquire_timeout)
            .sqlx_logging(false);
        let connection = Database::connect(options).await?;
        self.insert(name, connection);
        Ok(())
    }

    /// Connect every `DATABASE_<NAME>` DSN found in the environment.
    pub async fn from_env(configs: &HashMap<String, PoolConfig>) -> Result<Self> {
        let mut pools = HashMap::new();

        for (key, dsn) in std::env::vars() {
            if !key.starts_with(ENV_PREFIX) {
                continue;
            }
            let name = key[ENV_PREFIX.len()..].to_lowercase();
            let config = configs.get(&name).cloned().unwrap_or_default();

            let mut options = ConnectOptions::new(dsn);
            options
                .max_connections(config.pool_size)
                .acquire_timeout(config.acquire_timeout)
                .connect_timeout(config.acquire_timeout)
                .sqlx_logging(false);

            let connection = Database::connect(options).await?;
            tracing::info!(pool = %name, "Query pool connected");
            pools.insert(name, connection);
        }

        Ok(Self { pools })
    }

    pub fn names(&self) -> Vec<&str> {
        self.pools.keys().map(|s| s.as_str()).collect()
    }

    /// Run a query on the named pool and return the rows as JSON
    /// objects.
    pub async fn query(&self, pool: &str, sql: &str) -> Result<Vec<serde_json::Value>> {
        let connection = self
            .pools
            .get(pool)
            .ok_or_else(|| StorageError::InvalidState(format!("unknown query pool '{pool}'")))?;

        let statement = Statement::from_string(connection.get_database_backend(), sql.to_string());
        let rows = JsonValue::find_by_statement(statement)
            .all(connection)
            .await?;
        Ok(rows)
    }

    /// Close every pool, waiting for in-flight queries.
    pub async fn close(&self) -> Result<()> {
        for (name, connection) in &self.pools {
            if let Err(e) = connection.clone().close().await {
                tracing::error!(pool = %name, error = %e, "Failed to close query pool");
            }
        }
        Ok(())
    }
}
