use crate::{
    calculate_priority, AgeRule, AlertRule, CountRule, IssueSnapshot, PriorityLevels,
    ValueOperation, ValueRule,
};
use chrono::{Duration, Utc};
use sentinela_common::types::Priority;
use serde_json::json;

fn snapshot(id: i64, age_secs: i64, data: serde_json::Value) -> IssueSnapshot {
    IssueSnapshot {
        id,
        created_at: Utc::now() - Duration::seconds(age_secs),
        data,
    }
}

fn snapshots(count: usize) -> Vec<IssueSnapshot> {
    (0..count)
        .map(|i| snapshot(i as i64, 0, json!({"id": i})))
        .collect()
}

fn count_rule(low: f64, moderate: f64, high: f64, critical: f64) -> AlertRule {
    AlertRule::Count(CountRule {
        priority_levels: PriorityLevels {
            low: Some(low),
            moderate: Some(moderate),
            high: Some(high),
            critical: Some(critical),
            ..Default::default()
        },
    })
}

#[test]
fn count_rule_promotes_and_demotes_with_issue_count() {
    let rule = count_rule(0.0, 10.0, 20.0, 30.0);
    let now = Utc::now();

    assert_eq!(
        calculate_priority(&rule, &snapshots(11), now),
        Some(Priority::Moderate)
    );
    assert_eq!(
        calculate_priority(&rule, &snapshots(21), now),
        Some(Priority::High)
    );
    assert_eq!(
        calculate_priority(&rule, &snapshots(15), now),
        Some(Priority::Moderate)
    );
    assert_eq!(
        calculate_priority(&rule, &snapshots(31), now),
        Some(Priority::Critical)
    );
}

#[test]
fn count_equal_to_level_does_not_trigger_it() {
    let rule = count_rule(0.0, 10.0, 20.0, 30.0);
    let now = Utc::now();

    // Exactly 10 issues stays below moderate.
    assert_eq!(
        calculate_priority(&rule, &snapshots(10), now),
        Some(Priority::Low)
    );
    // Zero issues triggers nothing, even with a low level of 0.
    assert_eq!(calculate_priority(&rule, &[], now), None);
}

#[test]
fn value_rule_greater_than_takes_the_highest_triggered_issue() {
    let rule = AlertRule::Value(ValueRule {
        value_key: "value".to_string(),
        operation: ValueOperation::GreaterThan,
        priority_levels: PriorityLevels {
            low: Some(10.0),
            moderate: Some(50.0),
            high: Some(90.0),
            ..Default::default()
        },
    });

    let issues = vec![
        snapshot(1, 0, json!({"value": 10})),
        snapshot(2, 0, json!({"value": 50})),
        snapshot(3, 0, json!({"value": 51})),
    ];

    // 10 triggers nothing, 50 is only above the low level, 51 crosses
    // moderate. 50 is not > 50.
    assert_eq!(
        calculate_priority(&rule, &issues, Utc::now()),
        Some(Priority::Moderate)
    );
}

#[test]
fn value_rule_less_than_uses_strict_comparison() {
    let rule = AlertRule::Value(ValueRule {
        value_key: "free_percent".to_string(),
        operation: ValueOperation::LessThan,
        priority_levels: PriorityLevels {
            low: Some(20.0),
            critical: Some(5.0),
            ..Default::default()
        },
    });

    let at = |value: f64| vec![snapshot(1, 0, json!({"free_percent": value}))];

    assert_eq!(calculate_priority(&rule, &at(25.0), Utc::now()), None);
    assert_eq!(
        calculate_priority(&rule, &at(20.0), Utc::now()),
        None,
        "equal to the level must not trigger"
    );
    assert_eq!(
        calculate_priority(&rule, &at(19.0), Utc::now()),
        Some(Priority::Low)
    );
    assert_eq!(
        calculate_priority(&rule, &at(4.0), Utc::now()),
        Some(Priority::Critical)
    );
}

#[test]
fn value_rule_skips_missing_and_non_numeric_values() {
    let rule = AlertRule::Value(ValueRule {
        value_key: "value".to_string(),
        operation: ValueOperation::GreaterThan,
        priority_levels: PriorityLevels {
            low: Some(0.0),
            ..Default::default()
        },
    });

    let issues = vec![
        snapshot(1, 0, json!({"other": 99})),
        snapshot(2, 0, json!({"value": "not a number"})),
        snapshot(3, 0, json!({"value": null})),
    ];
    assert_eq!(calculate_priority(&rule, &issues, Utc::now()), None);

    // Numeric strings still count.
    let issues = vec![snapshot(1, 0, json!({"value": "3"}))];
    assert_eq!(
        calculate_priority(&rule, &issues, Utc::now()),
        Some(Priority::Low)
    );
}

#[test]
fn age_rule_follows_the_oldest_issue() {
    let rule = AlertRule::Age(AgeRule {
        priority_levels: PriorityLevels {
            low: Some(60.0),
            high: Some(300.0),
            ..Default::default()
        },
    });

    let now = Utc::now();
    let at_age = |secs: i64| vec![snapshot(1, secs, json!({}))];

    assert_eq!(calculate_priority(&rule, &at_age(30), now), None);
    assert_eq!(
        calculate_priority(&rule, &at_age(65), now),
        Some(Priority::Low)
    );
    assert_eq!(
        calculate_priority(&rule, &at_age(301), now),
        Some(Priority::High)
    );

    // Mixed ages: the oldest decides.
    let issues = vec![snapshot(1, 10, json!({})), snapshot(2, 400, json!({}))];
    assert_eq!(
        calculate_priority(&rule, &issues, now),
        Some(Priority::High)
    );
}

#[test]
fn evaluation_is_deterministic_under_reordering() {
    let rule = AlertRule::Value(ValueRule {
        value_key: "value".to_string(),
        operation: ValueOperation::GreaterThan,
        priority_levels: PriorityLevels {
            moderate: Some(50.0),
            low: Some(10.0),
            ..Default::default()
        },
    });

    let mut issues = vec![
        snapshot(3, 0, json!({"value": 51})),
        snapshot(1, 0, json!({"value": 10})),
        snapshot(2, 0, json!({"value": 50})),
    ];
    let now = Utc::now();
    let forward = calculate_priority(&rule, &issues, now);
    issues.reverse();
    assert_eq!(forward, calculate_priority(&rule, &issues, now));
    assert_eq!(forward, Some(Priority::Moderate));
}

#[test]
fn undefined_levels_are_skipped() {
    let rule = AlertRule::Count(CountRule {
        priority_levels: PriorityLevels {
            critical: Some(100.0),
            ..Default::default()
        },
    });
    let now = Utc::now();

    assert_eq!(calculate_priority(&rule, &snapshots(99), now), None);
    assert_eq!(
        calculate_priority(&rule, &snapshots(101), now),
        Some(Priority::Critical)
    );
}

#[test]
fn rule_serialization_round_trips() {
    let rule = AlertRule::Value(ValueRule {
        value_key: "lag".to_string(),
        operation: ValueOperation::LessThan,
        priority_levels: PriorityLevels {
            high: Some(1.5),
            ..Default::default()
        },
    });

    let encoded = serde_json::to_value(&rule).unwrap();
    assert_eq!(encoded["rule"], "value");
    assert_eq!(encoded["operation"], "less_than");
    let decoded: AlertRule = serde_json::from_value(encoded).unwrap();
    assert_eq!(decoded, rule);
}
