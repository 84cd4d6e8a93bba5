//! Sample monitor exercising the whole lifecycle: it counts its own
//! search runs in a variable, opens an issue every third run, and the
//! issue solves after two update passes.

use async_trait::async_trait;
use sentinela_alert::{AlertRule, CountRule, PriorityLevels};
use sentinela_common::value::IssueData;
use sentinela_registry::{
    AlertOptions, IssueOptions, MonitorCode, MonitorContext, MonitorDefinition, MonitorOptions,
    ReactionOptions,
};
use serde_json::json;
use std::sync::Arc;

pub fn definition() -> MonitorDefinition {
    MonitorDefinition {
        monitor_options: MonitorOptions {
            search_cron: Some("*/2 * * * *".to_string()),
            update_cron: Some("* * * * *".to_string()),
            max_issues_creation: None,
            execution_timeout: None,
        },
        issue_options: IssueOptions::new("id"),
        alert_options: Some(AlertOptions::new(AlertRule::Count(CountRule {
            priority_levels: PriorityLevels {
                low: Some(0.0),
                moderate: Some(2.0),
                ..Default::default()
            },
        }))),
        reaction_options: ReactionOptions::new(),
        notification_options: Vec::new(),
        code: Arc::new(SampleCounter),
        source: "sample://counter".to_string(),
    }
}

struct SampleCounter;

#[async_trait]
impl MonitorCode for SampleCounter {
    async fn search(&self, ctx: &MonitorContext) -> anyhow::Result<Option<Vec<IssueData>>> {
        let counter = ctx
            .get_variable("counter")
            .await?
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(0)
            + 1;
        ctx.set_variable("counter", Some(counter.to_string())).await?;

        if counter % 3 != 0 {
            return Ok(None);
        }

        let issue = json!({
            "id": format!("counter_{counter}"),
            "remaining": 2,
        });
        Ok(issue.as_object().map(|issue| vec![issue.clone()]))
    }

    async fn update(
        &self,
        _ctx: &MonitorContext,
        issues_data: Vec<IssueData>,
    ) -> anyhow::Result<Option<Vec<IssueData>>> {
        let mut updates = Vec::new();
        for mut issue in issues_data {
            let remaining = issue
                .get("remaining")
                .and_then(|value| value.as_i64())
                .unwrap_or(0);
            issue.insert("remaining".to_string(), json!((remaining - 1).max(0)));
            updates.push(issue);
        }
        Ok(Some(updates))
    }

    fn is_solved(&self, issue_data: &IssueData) -> anyhow::Result<bool> {
        Ok(issue_data
            .get("remaining")
            .and_then(|value| value.as_i64())
            .unwrap_or(0)
            <= 0)
    }
}
