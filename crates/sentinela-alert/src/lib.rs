//! Alert priority rule engine.
//!
//! An alert's priority is a pure, deterministic function of its rule and
//! the currently active issues linked to it. Three rule families exist:
//! count (how many active issues), age (oldest active issue), and value
//! (a numeric field read from each issue payload). Every comparison is
//! strict: a value exactly equal to a level does not trigger it.

mod rules;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use sentinela_common::types::Priority;
use serde::{Deserialize, Serialize};

/// Trigger values per priority level. `None` levels never trigger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorityLevels {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub informational: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<f64>,
}

impl PriorityLevels {
    pub fn get(&self, priority: Priority) -> Option<f64> {
        match priority {
            Priority::Informational => self.informational,
            Priority::Low => self.low,
            Priority::Moderate => self.moderate,
            Priority::High => self.high,
            Priority::Critical => self.critical,
        }
    }

    pub fn is_empty(&self) -> bool {
        Priority::ALL.iter().all(|p| self.get(*p).is_none())
    }
}

/// Comparison direction for [`ValueRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueOperation {
    GreaterThan,
    LessThan,
}

/// Priority from the number of active issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountRule {
    pub priority_levels: PriorityLevels,
}

/// Priority from the age in seconds of the oldest active issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeRule {
    pub priority_levels: PriorityLevels,
}

/// Priority from a numeric field of the issue payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRule {
    pub value_key: String,
    pub operation: ValueOperation,
    pub priority_levels: PriorityLevels,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum AlertRule {
    Count(CountRule),
    Age(AgeRule),
    Value(ValueRule),
}

impl AlertRule {
    pub fn priority_levels(&self) -> &PriorityLevels {
        match self {
            AlertRule::Count(rule) => &rule.priority_levels,
            AlertRule::Age(rule) => &rule.priority_levels,
            AlertRule::Value(rule) => &rule.priority_levels,
        }
    }
}

/// The slice of an issue a rule can see.
#[derive(Debug, Clone)]
pub struct IssueSnapshot {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// Calculate the priority for the rule over the given active issues, or
/// `None` when no level triggers. Issues are evaluated in stable id
/// order.
pub fn calculate_priority(
    rule: &AlertRule,
    issues: &[IssueSnapshot],
    now: DateTime<Utc>,
) -> Option<Priority> {
    let mut ordered: Vec<&IssueSnapshot> = issues.iter().collect();
    ordered.sort_by_key(|issue| issue.id);

    match rule {
        AlertRule::Count(count_rule) => rules::count_priority(count_rule, ordered.len()),
        AlertRule::Age(age_rule) => rules::age_priority(age_rule, &ordered, now),
        AlertRule::Value(value_rule) => rules::value_priority(value_rule, &ordered),
    }
}
