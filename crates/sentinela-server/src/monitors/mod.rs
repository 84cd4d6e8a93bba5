//! Compiled monitors shipped with the engine: the internal self-watch
//! monitors and the sample monitor used to try the engine out.

pub mod high_active_issues;
pub mod long_time_queued;
pub mod sample_counter;

use crate::config::Config;
use sentinela_common::types::Priority;
use sentinela_registry::{DefinitionCatalog, MonitorDefinition, NotificationSpec};

/// Internal monitors, name-prefixed `internal.`.
pub fn internal_monitors() -> Vec<(String, MonitorDefinition)> {
    vec![
        (
            "internal.long_time_queued".to_string(),
            long_time_queued::definition(),
        ),
        (
            "internal.high_active_issues_count".to_string(),
            high_active_issues::definition(),
        ),
    ]
}

/// Sample monitors, registered only when `load_sample_monitors` is set.
pub fn sample_monitors() -> Vec<(String, MonitorDefinition)> {
    vec![("sample_counter".to_string(), sample_counter::definition())]
}

/// Notification spec the internal monitors carry when
/// `internal_monitors_notification` is enabled.
fn internal_notification(config: &Config) -> Option<NotificationSpec> {
    let settings = &config.internal_monitors_notification;
    if !settings.enabled {
        return None;
    }
    if settings.notification_class.is_empty() {
        tracing::warn!("internal_monitors_notification enabled without a notification_class");
        return None;
    }

    let mut spec = NotificationSpec::new(settings.notification_class.clone());
    spec.min_priority_to_send = Priority::Informational;
    spec.params = settings.params.clone();
    Some(spec)
}

/// Build the definition catalog for this process: internal monitors
/// (with their configured notification) plus samples when enabled.
/// Plugin-provided monitors are inserted by the plugin loader on top.
pub fn build_catalog(config: &Config) -> DefinitionCatalog {
    let mut catalog = DefinitionCatalog::new();

    let notification = internal_notification(config);
    for (name, mut definition) in internal_monitors() {
        if let Some(spec) = &notification {
            definition.notification_options.push(spec.clone());
        }
        catalog.insert(&name, definition);
    }

    if config.load_sample_monitors {
        for (name, definition) in sample_monitors() {
            catalog.insert(&name, definition);
        }
    }

    catalog
}
