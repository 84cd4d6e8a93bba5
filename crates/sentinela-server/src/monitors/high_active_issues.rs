//! Internal monitor watching for monitors accumulating too many active
//! issues, usually a sign of a runaway search or a solve path that
//! stopped working.

use async_trait::async_trait;
use sentinela_alert::{AlertRule, PriorityLevels, ValueOperation, ValueRule};
use sentinela_common::value::IssueData;
use sentinela_registry::{
    AlertOptions, IssueOptions, MonitorCode, MonitorContext, MonitorDefinition, MonitorOptions,
    ReactionOptions,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Active issue count that turns a monitor into an issue here.
const ISSUES_COUNT_THRESHOLD: i64 = 1000;

pub fn definition() -> MonitorDefinition {
    MonitorDefinition {
        monitor_options: MonitorOptions {
            search_cron: Some("*/10 * * * *".to_string()),
            update_cron: Some("*/10 * * * *".to_string()),
            max_issues_creation: None,
            execution_timeout: None,
        },
        issue_options: IssueOptions::new("monitor_id"),
        alert_options: Some(AlertOptions::new(AlertRule::Value(ValueRule {
            value_key: "issues_count".to_string(),
            operation: ValueOperation::GreaterThan,
            priority_levels: PriorityLevels {
                moderate: Some(ISSUES_COUNT_THRESHOLD as f64),
                high: Some(5_000.0),
                critical: Some(10_000.0),
                ..Default::default()
            },
        }))),
        reaction_options: ReactionOptions::new(),
        notification_options: Vec::new(),
        code: Arc::new(HighActiveIssues),
        source: "internal://high_active_issues_count".to_string(),
    }
}

struct HighActiveIssues;

async fn active_issue_counts(ctx: &MonitorContext) -> anyhow::Result<HashMap<i64, i64>> {
    let rows = ctx
        .query(
            "application",
            "SELECT monitor_id, COUNT(*) AS issues_count FROM issues \
             WHERE status = 'active' GROUP BY monitor_id",
        )
        .await?;

    let mut counts = HashMap::new();
    for row in rows {
        let Some(monitor_id) = row.get("monitor_id").and_then(|v| v.as_i64()) else {
            continue;
        };
        let count = row.get("issues_count").and_then(|v| v.as_i64()).unwrap_or(0);
        counts.insert(monitor_id, count);
    }
    Ok(counts)
}

#[async_trait]
impl MonitorCode for HighActiveIssues {
    async fn search(&self, ctx: &MonitorContext) -> anyhow::Result<Option<Vec<IssueData>>> {
        let mut found = Vec::new();
        for (monitor_id, issues_count) in active_issue_counts(ctx).await? {
            if issues_count <= ISSUES_COUNT_THRESHOLD {
                continue;
            }
            let issue = json!({
                "monitor_id": monitor_id,
                "issues_count": issues_count,
            });
            if let Some(issue) = issue.as_object() {
                found.push(issue.clone());
            }
        }
        Ok(Some(found))
    }

    async fn update(
        &self,
        ctx: &MonitorContext,
        issues_data: Vec<IssueData>,
    ) -> anyhow::Result<Option<Vec<IssueData>>> {
        let counts = active_issue_counts(ctx).await?;

        let mut updates = Vec::new();
        for mut issue in issues_data {
            let Some(monitor_id) = issue.get("monitor_id").and_then(|v| v.as_i64()) else {
                continue;
            };
            let issues_count = counts.get(&monitor_id).copied().unwrap_or(0);
            issue.insert("issues_count".to_string(), json!(issues_count));
            updates.push(issue);
        }
        Ok(Some(updates))
    }

    fn is_solved(&self, issue_data: &IssueData) -> anyhow::Result<bool> {
        let issues_count = issue_data
            .get("issues_count")
            .and_then(|v| v.as_i64())
            .unwrap_or(i64::MAX);
        Ok(issues_count <= ISSUES_COUNT_THRESHOLD)
    }
}
