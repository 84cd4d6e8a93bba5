use crate::options::MonitorDefinition;
use sentinela_alert::AlertRule;
use sentinela_common::events::is_known_event;
use sentinela_common::name::normalize_monitor_name;
use sentinela_common::time::parse_cron;
use std::collections::HashSet;

/// A definition that failed validation, with every problem found.
#[derive(Debug, thiserror::Error)]
#[error("monitor '{monitor_name}' has validation errors: {}", errors_found.join("; "))]
pub struct ValidationError {
    pub monitor_name: String,
    pub errors_found: Vec<String>,
}

/// Check a definition's option consistency. Returns every problem
/// found; an empty list means the definition is valid. Signature
/// checking is the type system's job, so this covers what the compiler
/// cannot see.
pub fn validate_definition(name: &str, definition: &MonitorDefinition) -> Vec<String> {
    let mut errors = Vec::new();

    if normalize_monitor_name(name).is_empty() {
        errors.push("monitor name is empty after normalization".to_string());
    }

    let options = &definition.monitor_options;
    if options.search_cron.is_none() && options.update_cron.is_none() {
        errors.push("at least one of 'search_cron' or 'update_cron' must be set".to_string());
    }
    for (field, cron) in [
        ("search_cron", &options.search_cron),
        ("update_cron", &options.update_cron),
    ] {
        if let Some(expression) = cron {
            if let Err(e) = parse_cron(expression) {
                errors.push(format!("'{field}' is not a valid cron expression: {e}"));
            }
        }
    }
    if options.max_issues_creation == Some(0) {
        errors.push("'max_issues_creation' must be greater than zero".to_string());
    }

    if definition.issue_options.model_id_key.is_empty() {
        errors.push("'model_id_key' is required".to_string());
    }

    if let Some(alert_options) = &definition.alert_options {
        if alert_options.rule.priority_levels().is_empty() {
            errors.push("alert rule defines no priority levels".to_string());
        }
        if let AlertRule::Value(value_rule) = &alert_options.rule {
            if value_rule.value_key.is_empty() {
                errors.push("value rule requires a 'value_key'".to_string());
            }
        }
    }

    for event_name in definition.reaction_options.event_names() {
        if !is_known_event(event_name) {
            errors.push(format!("unknown event name '{event_name}' in reaction_options"));
        }
    }

    let mut seen_channels = HashSet::new();
    for spec in &definition.notification_options {
        if spec.channel.is_empty() {
            errors.push("notification spec with empty channel".to_string());
        } else if !seen_channels.insert(spec.channel.as_str()) {
            errors.push(format!(
                "duplicate notification for channel '{}'",
                spec.channel
            ));
        }
    }

    errors
}

/// Validate and wrap failures in a [`ValidationError`].
pub fn check_definition(
    name: &str,
    definition: &MonitorDefinition,
) -> Result<(), ValidationError> {
    let errors_found = validate_definition(name, definition);
    if errors_found.is_empty() {
        return Ok(());
    }
    Err(ValidationError {
        monitor_name: name.to_string(),
        errors_found,
    })
}
