use serde::Deserialize;
use std::collections::HashMap;

/// Environment variable pointing at the configuration file.
pub const CONFIGS_FILE_ENV: &str = "CONFIGS_FILE";
/// DSN of the engine's own store.
pub const DATABASE_APPLICATION_ENV: &str = "DATABASE_APPLICATION";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub plugins: Vec<String>,

    #[serde(default)]
    pub load_sample_monitors: bool,
    #[serde(default = "default_sample_monitors_path")]
    pub sample_monitors_path: String,
    #[serde(default = "default_internal_monitors_path")]
    pub internal_monitors_path: String,
    #[serde(default)]
    pub internal_monitors_notification: InternalMonitorsNotification,

    #[serde(default = "default_monitors_load_schedule")]
    pub monitors_load_schedule: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub application_database_settings: ApplicationDatabaseSettings,

    #[serde(default)]
    pub application_queue: QueueConfig,

    #[serde(default)]
    pub http_server: HttpServerConfig,

    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    #[serde(default = "default_controller_process_schedule")]
    pub controller_process_schedule: String,
    #[serde(default = "default_controller_concurrency")]
    pub controller_concurrency: usize,
    #[serde(default = "default_controller_procedures")]
    pub controller_procedures: HashMap<String, ProcedureConfig>,

    #[serde(default = "default_executor_concurrency")]
    pub executor_concurrency: usize,
    #[serde(default = "default_executor_sleep")]
    pub executor_sleep: u64,
    #[serde(default = "default_executor_monitor_timeout")]
    pub executor_monitor_timeout: u64,
    #[serde(default = "default_executor_reaction_timeout")]
    pub executor_reaction_timeout: u64,
    #[serde(default = "default_executor_request_timeout")]
    pub executor_request_timeout: u64,
    #[serde(default = "default_executor_monitor_heartbeat_time")]
    pub executor_monitor_heartbeat_time: u64,

    #[serde(default = "default_max_issues_creation")]
    pub max_issues_creation: usize,

    #[serde(default = "default_database_acquire_timeout")]
    pub database_default_acquire_timeout: u64,
    #[serde(default = "default_database_query_timeout")]
    pub database_default_query_timeout: u64,
    #[serde(default = "default_database_close_timeout")]
    pub database_close_timeout: u64,
    #[serde(default)]
    pub database_log_query_metrics: bool,

    #[serde(default)]
    pub databases_pools_configs: HashMap<String, DatabasePoolConfig>,

    #[serde(default)]
    pub log_all_events: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InternalMonitorsNotification {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub notification_class: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingMode {
    Friendly,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_mode")]
    pub mode: LoggingMode,
    /// Directive filter (`RUST_LOG` syntax); the environment overrides.
    #[serde(default = "default_logging_format")]
    pub format: String,
    /// Constant fields stamped on every record in json mode.
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            mode: default_logging_mode(),
            format: default_logging_format(),
            fields: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationDatabaseSettings {
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl Default for ApplicationDatabaseSettings {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
        }
    }
}

/// Work-queue selection. `internal` runs the in-process FIFO; `sqs`
/// targets an SQS-shaped broker endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_type", rename = "type")]
    pub queue_type: String,
    #[serde(default = "default_queue_wait_message_time")]
    pub queue_wait_message_time: u64,
    #[serde(default = "default_queue_visibility_time")]
    pub queue_visibility_time: u64,
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,

    // Broker fields
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_type: default_queue_type(),
            queue_wait_message_time: default_queue_wait_message_time(),
            queue_visibility_time: default_queue_visibility_time(),
            capacity: default_queue_capacity(),
            endpoint: None,
            url: None,
            headers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcedureConfig {
    pub schedule: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabasePoolConfig {
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_database_acquire_timeout")]
    pub acquire_timeout: u64,
}

fn default_sample_monitors_path() -> String {
    "sample_monitors".to_string()
}

fn default_internal_monitors_path() -> String {
    "internal_monitors".to_string()
}

fn default_monitors_load_schedule() -> String {
    "*/5 * * * *".to_string()
}

fn default_logging_mode() -> LoggingMode {
    LoggingMode::Friendly
}

fn default_logging_format() -> String {
    "info".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_queue_type() -> String {
    "internal".to_string()
}

fn default_queue_wait_message_time() -> u64 {
    2
}

fn default_queue_visibility_time() -> u64 {
    60
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_http_port() -> u16 {
    8000
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

fn default_controller_process_schedule() -> String {
    "* * * * *".to_string()
}

fn default_controller_concurrency() -> usize {
    10
}

fn default_controller_procedures() -> HashMap<String, ProcedureConfig> {
    let mut procedures = HashMap::new();
    procedures.insert(
        "monitors_stuck".to_string(),
        ProcedureConfig {
            schedule: "*/5 * * * *".to_string(),
            params: HashMap::from([("time_tolerance".to_string(), serde_json::json!(300))]),
        },
    );
    procedures.insert(
        "notifications_alert_solved".to_string(),
        ProcedureConfig {
            schedule: "*/5 * * * *".to_string(),
            params: HashMap::new(),
        },
    );
    procedures
}

fn default_executor_concurrency() -> usize {
    4
}

fn default_executor_sleep() -> u64 {
    2
}

fn default_executor_monitor_timeout() -> u64 {
    300
}

fn default_executor_reaction_timeout() -> u64 {
    30
}

fn default_executor_request_timeout() -> u64 {
    30
}

fn default_executor_monitor_heartbeat_time() -> u64 {
    30
}

fn default_max_issues_creation() -> usize {
    100
}

fn default_database_acquire_timeout() -> u64 {
    10
}

fn default_database_query_timeout() -> u64 {
    30
}

fn default_database_close_timeout() -> u64 {
    15
}

impl Config {
    /// Load from the path in `CONFIGS_FILE` (default `configs.yaml`).
    pub fn from_env() -> anyhow::Result<Self> {
        let path =
            std::env::var(CONFIGS_FILE_ENV).unwrap_or_else(|_| "configs.yaml".to_string());
        Self::load(&path)
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read configs file '{path}': {e}"))?;
        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse configs file '{path}': {e}"))?;
        Ok(config)
    }

    /// Every field at its default, as an empty configuration file
    /// would produce.
    pub fn empty() -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str("{}")?)
    }

    pub fn queue_wait_time(&self) -> u64 {
        self.application_queue.queue_wait_message_time
    }

    pub fn queue_visibility_time(&self) -> u64 {
        self.application_queue.queue_visibility_time
    }
}
