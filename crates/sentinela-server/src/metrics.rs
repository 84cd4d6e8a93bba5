//! Prometheus metrics for the engine, rendered at `GET /metrics`.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub static CONTROLLER_MONITORS_PROCESSED: OnceLock<Counter> = OnceLock::new();
pub static CONTROLLER_QUEUE_ERRORS: OnceLock<Counter> = OnceLock::new();
pub static EXECUTOR_MESSAGES: OnceLock<CounterVec> = OnceLock::new();
pub static EXECUTOR_MESSAGE_ERRORS: OnceLock<CounterVec> = OnceLock::new();
pub static EXECUTOR_MESSAGES_PROCESSING: OnceLock<Gauge> = OnceLock::new();
pub static MONITOR_EXECUTION_ERRORS: OnceLock<CounterVec> = OnceLock::new();
pub static MONITOR_EXECUTION_TIMEOUTS: OnceLock<CounterVec> = OnceLock::new();
pub static MONITOR_NOT_REGISTERED: OnceLock<Counter> = OnceLock::new();
pub static SEARCH_ISSUES_LIMIT_REACHED: OnceLock<CounterVec> = OnceLock::new();
pub static REACTION_ERRORS: OnceLock<CounterVec> = OnceLock::new();
pub static REACTION_TIMEOUTS: OnceLock<CounterVec> = OnceLock::new();
pub static REQUEST_ERRORS: OnceLock<Counter> = OnceLock::new();
pub static MONITORS_STUCK_RESET: OnceLock<Counter> = OnceLock::new();
pub static OUTBOX_EVENTS_PUBLISHED: OnceLock<Counter> = OnceLock::new();

fn counter(registry: &Registry, cell: &OnceLock<Counter>, name: &str, help: &str) {
    if let Ok(metric) = Counter::with_opts(Opts::new(name, help)) {
        if registry.register(Box::new(metric.clone())).is_ok() {
            let _ = cell.set(metric);
        }
    }
}

fn counter_vec(
    registry: &Registry,
    cell: &OnceLock<CounterVec>,
    name: &str,
    help: &str,
    labels: &[&str],
) {
    if let Ok(metric) = CounterVec::new(Opts::new(name, help), labels) {
        if registry.register(Box::new(metric.clone())).is_ok() {
            let _ = cell.set(metric);
        }
    }
}

fn register_all(registry: &Registry) {
    counter(
        registry,
        &CONTROLLER_MONITORS_PROCESSED,
        "sentinela_controller_monitors_processed_count",
        "Count of monitors processed by the controller",
    );
    counter(
        registry,
        &CONTROLLER_QUEUE_ERRORS,
        "sentinela_controller_task_queue_error_count",
        "Count of times the controller failed to queue a task",
    );
    counter_vec(
        registry,
        &EXECUTOR_MESSAGES,
        "sentinela_executor_message_count",
        "Count of messages consumed by the executors",
        &["message_kind"],
    );
    counter_vec(
        registry,
        &EXECUTOR_MESSAGE_ERRORS,
        "sentinela_executor_message_error_count",
        "Count of errors when processing messages",
        &["message_kind"],
    );
    if let Ok(metric) = Gauge::with_opts(Opts::new(
        "sentinela_executor_message_processing_count",
        "Messages currently being processed by the executors",
    )) {
        if registry.register(Box::new(metric.clone())).is_ok() {
            let _ = EXECUTOR_MESSAGES_PROCESSING.set(metric);
        }
    }
    counter_vec(
        registry,
        &MONITOR_EXECUTION_ERRORS,
        "sentinela_executor_monitor_execution_error",
        "Error count for monitor executions",
        &["monitor_name"],
    );
    counter_vec(
        registry,
        &MONITOR_EXECUTION_TIMEOUTS,
        "sentinela_executor_monitor_execution_timeout",
        "Timeout count for monitor executions",
        &["monitor_name"],
    );
    counter(
        registry,
        &MONITOR_NOT_REGISTERED,
        "sentinela_monitor_not_registered_count",
        "Count of times a monitor was not registered after a load attempt",
    );
    counter_vec(
        registry,
        &SEARCH_ISSUES_LIMIT_REACHED,
        "sentinela_executor_monitor_search_issues_limit_reached",
        "Count of search runs that hit the issue creation limit",
        &["monitor_name"],
    );
    counter_vec(
        registry,
        &REACTION_ERRORS,
        "sentinela_executor_reaction_execution_error",
        "Error count for reactions",
        &["monitor_name", "event_name"],
    );
    counter_vec(
        registry,
        &REACTION_TIMEOUTS,
        "sentinela_executor_reaction_execution_timeout",
        "Timeout count for reactions",
        &["monitor_name", "event_name"],
    );
    counter(
        registry,
        &REQUEST_ERRORS,
        "sentinela_executor_request_error_count",
        "Count of failed request actions",
    );
    counter(
        registry,
        &MONITORS_STUCK_RESET,
        "sentinela_controller_monitors_stuck_reset_count",
        "Count of stuck monitors reset by the janitorial procedure",
    );
    counter(
        registry,
        &OUTBOX_EVENTS_PUBLISHED,
        "sentinela_outbox_events_published_count",
        "Count of events published from the outbox to the queue",
    );
}

/// Global registry, initialized on first touch.
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        let registry = Registry::new();
        register_all(&registry);
        registry
    })
}

/// Increment a plain counter if it is registered.
pub fn inc(cell: &OnceLock<Counter>) {
    registry();
    if let Some(metric) = cell.get() {
        metric.inc();
    }
}

/// Increment a labelled counter if it is registered.
pub fn inc_with(cell: &OnceLock<CounterVec>, labels: &[&str]) {
    registry();
    if let Some(metric) = cell.get() {
        metric.with_label_values(labels).inc();
    }
}

pub fn gauge_add(cell: &OnceLock<Gauge>, delta: f64) {
    registry();
    if let Some(metric) = cell.get() {
        metric.add(delta);
    }
}

/// Render every metric in the Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&registry().gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
