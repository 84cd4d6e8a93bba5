use crate::{AgeRule, CountRule, IssueSnapshot, PriorityLevels, ValueOperation, ValueRule};
use chrono::{DateTime, Utc};
use sentinela_common::types::Priority;
use sentinela_common::value::as_number;

/// Walk levels most-urgent first and return the first whose reference
/// value the predicate triggers.
fn first_triggered(
    levels: &PriorityLevels,
    mut triggered: impl FnMut(f64) -> bool,
) -> Option<Priority> {
    for priority in Priority::ALL {
        let Some(reference) = levels.get(priority) else {
            continue;
        };
        if triggered(reference) {
            return Some(priority);
        }
    }
    None
}

pub(crate) fn count_priority(rule: &CountRule, count: usize) -> Option<Priority> {
    first_triggered(&rule.priority_levels, |reference| count as f64 > reference)
}

pub(crate) fn age_priority(
    rule: &AgeRule,
    issues: &[&IssueSnapshot],
    now: DateTime<Utc>,
) -> Option<Priority> {
    let ages: Vec<f64> = issues
        .iter()
        .map(|issue| (now - issue.created_at).num_milliseconds() as f64 / 1000.0)
        .collect();

    first_triggered(&rule.priority_levels, |reference| {
        ages.iter().any(|age| *age > reference)
    })
}

pub(crate) fn value_priority(rule: &ValueRule, issues: &[&IssueSnapshot]) -> Option<Priority> {
    let values: Vec<f64> = issues
        .iter()
        .filter_map(|issue| issue.data.get(&rule.value_key).and_then(as_number))
        .collect();

    first_triggered(&rule.priority_levels, |reference| {
        values.iter().any(|value| match rule.operation {
            ValueOperation::GreaterThan => *value > reference,
            ValueOperation::LessThan => *value < reference,
        })
    })
}
