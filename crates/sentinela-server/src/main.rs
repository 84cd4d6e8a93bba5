use anyhow::Result;
use chrono::Utc;
use sentinela_notify::{ChannelRegistry, NotificationManager};
use sentinela_queue::{broker::BrokerQueue, internal::InternalQueue, WorkQueue};
use sentinela_registry::Registry;
use sentinela_storage::pools::PoolConfig;
use sentinela_storage::{QueryPools, Store, StoreSettings};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;

use sentinela_server::config::{Config, DATABASE_APPLICATION_ENV};
use sentinela_server::state::{AppState, Diagnostics, PluginActions, RegistryReactions};
use sentinela_server::{controller, executor, http, loader, logging, monitors, outbox};

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  sentinela [controller] [executor]");
    eprintln!();
    eprintln!("Runs both components when no mode is given. Configuration is read");
    eprintln!("from $CONFIGS_FILE (default configs.yaml); the application store DSN");
    eprintln!("comes from $DATABASE_APPLICATION.");
}

#[tokio::main]
async fn main() -> Result<()> {
    let modes: Vec<String> = std::env::args().skip(1).collect();
    let modes = if modes.is_empty() {
        vec!["controller".to_string(), "executor".to_string()]
    } else {
        modes
    };

    for mode in &modes {
        if mode != "controller" && mode != "executor" {
            print_usage();
            anyhow::bail!("unknown operation mode '{mode}'");
        }
    }
    let controller_enabled = modes.iter().any(|mode| mode == "controller");
    let executor_enabled = modes.iter().any(|mode| mode == "executor");

    let config = Config::from_env()?;
    logging::setup(&config.logging)?;

    run(config, controller_enabled, executor_enabled).await
}

fn build_queue(config: &Config) -> Result<Arc<dyn WorkQueue>> {
    let queue_config = &config.application_queue;
    let visibility = Duration::from_secs(queue_config.queue_visibility_time);

    match queue_config.queue_type.as_str() {
        "internal" => Ok(Arc::new(InternalQueue::new(
            queue_config.capacity,
            visibility,
        ))),
        "sqs" => {
            let endpoint = queue_config
                .endpoint
                .clone()
                .ok_or_else(|| anyhow::anyhow!("application_queue.endpoint is required for sqs"))?;
            let url = queue_config
                .url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("application_queue.url is required for sqs"))?;
            Ok(Arc::new(BrokerQueue::new(
                endpoint,
                url,
                queue_config.headers.clone(),
                visibility,
            )))
        }
        other => anyhow::bail!("unknown application_queue.type '{other}'"),
    }
}

async fn run(config: Config, controller_enabled: bool, executor_enabled: bool) -> Result<()> {
    let time_zone = sentinela_common::time::parse_time_zone(&config.time_zone)?;

    if !config.plugins.is_empty() {
        tracing::info!(plugins = ?config.plugins, "Plugin list configured; plugins register through the catalog and action registries");
    }

    let registry = Arc::new(Registry::new());
    let catalog = Arc::new(monitors::build_catalog(&config));

    let db_url = std::env::var(DATABASE_APPLICATION_ENV)
        .map_err(|_| anyhow::anyhow!("{DATABASE_APPLICATION_ENV} environment variable is required"))?;
    let store = Arc::new(
        Store::connect(
            &db_url,
            StoreSettings {
                pool_size: config.application_database_settings.pool_size,
                acquire_timeout: Duration::from_secs(config.database_default_acquire_timeout),
                query_timeout: Duration::from_secs(config.database_default_query_timeout),
                log_query_metrics: config.database_log_query_metrics,
            },
            Arc::new(RegistryReactions(registry.clone())),
            config.log_all_events,
        )
        .await?,
    );

    let pool_configs: HashMap<String, PoolConfig> = config
        .databases_pools_configs
        .iter()
        .map(|(name, settings)| {
            (
                name.to_lowercase(),
                PoolConfig {
                    pool_size: settings.pool_size,
                    acquire_timeout: Duration::from_secs(settings.acquire_timeout),
                },
            )
        })
        .collect();
    let pools = Arc::new(QueryPools::from_env(&pool_configs).await?);

    let queue = build_queue(&config)?;
    let notifier = Arc::new(NotificationManager::new(
        store.clone(),
        ChannelRegistry::default(),
    ));

    let state = AppState {
        config: Arc::new(config),
        time_zone,
        store: store.clone(),
        queue,
        registry: registry.clone(),
        catalog,
        notifier,
        pools: pools.clone(),
        plugin_actions: Arc::new(PluginActions::default()),
        diagnostics: Arc::new(Diagnostics::default()),
        started_at: Utc::now(),
        controller_enabled,
        executor_enabled,
    };

    // Only the controller-elected process registers the catalog
    // monitors, preventing duplicate inserts across replicas.
    if controller_enabled {
        loader::register_catalog_monitors(&state).await?;
    }
    loader::load_monitors(&state).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut components = Vec::new();

    components.push(tokio::spawn(loader::run(state.clone(), shutdown_rx.clone())));
    components.push(tokio::spawn(outbox::run(state.clone(), shutdown_rx.clone())));
    if controller_enabled {
        let controller = controller::Controller::new(state.clone());
        components.push(tokio::spawn(controller.run(shutdown_rx.clone())));
    }
    if executor_enabled {
        components.push(tokio::spawn(executor::run(state.clone(), shutdown_rx.clone())));
    }

    let http_addr = format!("0.0.0.0:{}", state.config.http_server.port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    let app = http::router(state.clone());
    let mut http_shutdown = shutdown_rx.clone();
    components.push(tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = http_shutdown.changed().await;
        });
        if let Err(e) = server.await {
            tracing::error!(error = %e, "HTTP server error");
        }
    }));

    tracing::info!(
        http = %http_addr,
        controller = controller_enabled,
        executor = executor_enabled,
        "Sentinela started"
    );

    signal::ctrl_c().await?;
    tracing::info!("Shutting down gracefully");

    // Two-phase shutdown: stop accepting work, wait for in-flight
    // tasks up to the drain deadline, then close the pools.
    let _ = shutdown_tx.send(true);
    let drain = Duration::from_secs(state.config.database_close_timeout);
    let draining = futures::future::join_all(components);
    if tokio::time::timeout(drain, draining).await.is_err() {
        tracing::warn!("Drain deadline reached, abandoning in-flight tasks");
    }

    if let Err(e) = store.close().await {
        tracing::error!(error = %e, "Failed to close application store");
    }
    if let Err(e) = pools.close().await {
        tracing::error!(error = %e, "Failed to close query pools");
    }

    tracing::info!("Sentinela stopped");
    Ok(())
}
