//! Internal monitor watching for monitors stuck in the queued state:
//! the controller claimed them but no executor picked the work up
//! within the tolerance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinela_alert::{AlertRule, CountRule, PriorityLevels};
use sentinela_common::value::IssueData;
use sentinela_registry::{
    AlertOptions, IssueOptions, MonitorCode, MonitorContext, MonitorDefinition, MonitorOptions,
    ReactionOptions,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

/// Seconds a monitor may stay queued before it becomes an issue.
const QUEUED_TIME_TOLERANCE: i64 = 600;

pub fn definition() -> MonitorDefinition {
    MonitorDefinition {
        monitor_options: MonitorOptions {
            search_cron: Some("*/5 * * * *".to_string()),
            update_cron: Some("*/5 * * * *".to_string()),
            max_issues_creation: None,
            execution_timeout: None,
        },
        issue_options: IssueOptions::new("monitor_id"),
        alert_options: Some(AlertOptions::new(AlertRule::Count(CountRule {
            priority_levels: PriorityLevels {
                low: Some(0.0),
                moderate: Some(2.0),
                high: Some(5.0),
                ..Default::default()
            },
        }))),
        reaction_options: ReactionOptions::new(),
        notification_options: Vec::new(),
        code: Arc::new(LongTimeQueued),
        source: "internal://long_time_queued".to_string(),
    }
}

struct LongTimeQueued;

/// Timestamps come back from the query pool as text; accept the common
/// database renderings.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f %:z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(parsed) = DateTime::parse_from_str(value, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    None
}

async fn queued_monitors(ctx: &MonitorContext) -> anyhow::Result<Vec<(i64, String, Option<DateTime<Utc>>)>> {
    let rows = ctx
        .query(
            "application",
            "SELECT id, name, queued_at FROM monitors WHERE queued = TRUE AND running = FALSE",
        )
        .await?;

    let mut monitors = Vec::new();
    for row in rows {
        let Some(id) = row.get("id").and_then(|v| v.as_i64()) else {
            continue;
        };
        let name = row
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let queued_at = row
            .get("queued_at")
            .and_then(|v| v.as_str())
            .and_then(parse_timestamp);
        monitors.push((id, name, queued_at));
    }
    Ok(monitors)
}

#[async_trait]
impl MonitorCode for LongTimeQueued {
    async fn search(&self, ctx: &MonitorContext) -> anyhow::Result<Option<Vec<IssueData>>> {
        let now = Utc::now();
        let mut found = Vec::new();

        for (id, name, queued_at) in queued_monitors(ctx).await? {
            let Some(queued_at) = queued_at else {
                continue;
            };
            let queued_seconds = (now - queued_at).num_seconds();
            if queued_seconds <= QUEUED_TIME_TOLERANCE {
                continue;
            }
            let issue = json!({
                "monitor_id": id,
                "monitor_name": name,
                "queued_at": queued_at.to_rfc3339(),
                "queued_seconds": queued_seconds,
                "still_queued": true,
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
        let now = Utc::now();
        let queued: HashSet<i64> = queued_monitors(ctx)
            .await?
            .into_iter()
            .map(|(id, _, _)| id)
            .collect();

        let mut updates = Vec::new();
        for mut issue in issues_data {
            let Some(id) = issue.get("monitor_id").and_then(|v| v.as_i64()) else {
                continue;
            };
            let still_queued = queued.contains(&id);
            issue.insert("still_queued".to_string(), json!(still_queued));
            if still_queued {
                if let Some(queued_at) = issue
                    .get("queued_at")
                    .and_then(|v| v.as_str())
                    .and_then(parse_timestamp)
                {
                    issue.insert(
                        "queued_seconds".to_string(),
                        json!((now - queued_at).num_seconds()),
                    );
                }
            }
            updates.push(issue);
        }
        Ok(Some(updates))
    }

    fn is_solved(&self, issue_data: &IssueData) -> anyhow::Result<bool> {
        Ok(!issue_data
            .get("still_queued")
            .and_then(|v| v.as_bool())
            .unwrap_or(true))
    }
}
