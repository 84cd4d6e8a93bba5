use crate::MonitorCode;
use futures::future::BoxFuture;
use sentinela_alert::AlertRule;
use sentinela_common::types::{EventPayload, Priority};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Scheduling and execution limits of a monitor. Unset fields fall back
/// to the configuration defaults.
#[derive(Debug, Clone, Default)]
pub struct MonitorOptions {
    /// Cron expression scheduling the search routine.
    pub search_cron: Option<String>,
    /// Cron expression scheduling the update routine.
    pub update_cron: Option<String>,
    /// Cap on issues created per search run.
    pub max_issues_creation: Option<usize>,
    /// Timeout covering one full search/update run.
    pub execution_timeout: Option<Duration>,
}

/// Issue identity and lifecycle settings.
#[derive(Debug, Clone)]
pub struct IssueOptions {
    /// Key that uniquely identifies each issue inside its payload.
    pub model_id_key: String,
    /// Whether issues can be solved automatically via `is_solved`.
    /// Non-solvable issues require manual intervention.
    pub solvable: bool,
    /// Only one issue ever per model id, terminal ones included.
    pub unique: bool,
}

impl IssueOptions {
    pub fn new(model_id_key: impl Into<String>) -> Self {
        Self {
            model_id_key: model_id_key.into(),
            solvable: true,
            unique: false,
        }
    }

    pub fn not_solvable(mut self) -> Self {
        self.solvable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Alert aggregation settings.
#[derive(Debug, Clone)]
pub struct AlertOptions {
    pub rule: AlertRule,
    /// Reset the acknowledgement whenever new issues link to the alert.
    pub dismiss_acknowledge_on_new_issues: bool,
}

impl AlertOptions {
    pub fn new(rule: AlertRule) -> Self {
        Self {
            rule,
            dismiss_acknowledge_on_new_issues: false,
        }
    }

    pub fn dismiss_acknowledge_on_new_issues(mut self) -> Self {
        self.dismiss_acknowledge_on_new_issues = true;
        self
    }
}

/// An async callback bound to an event name.
pub type ReactionFn =
    Arc<dyn Fn(EventPayload) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Reactions per event name.
#[derive(Clone, Default)]
pub struct ReactionOptions {
    reactions: HashMap<String, Vec<ReactionFn>>,
}

impl ReactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a callback to an event name. Unknown names are rejected at
    /// validation time, not here.
    pub fn on<F>(mut self, event_name: &str, reaction: F) -> Self
    where
        F: Fn(EventPayload) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.push(event_name, Arc::new(reaction));
        self
    }

    pub fn push(&mut self, event_name: &str, reaction: ReactionFn) {
        self.reactions
            .entry(event_name.to_string())
            .or_default()
            .push(reaction);
    }

    pub fn get(&self, event_name: &str) -> &[ReactionFn] {
        self.reactions
            .get(event_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has(&self, event_name: &str) -> bool {
        !self.get(event_name).is_empty()
    }

    pub fn event_names(&self) -> impl Iterator<Item = &str> {
        self.reactions
            .iter()
            .filter(|(_, reactions)| !reactions.is_empty())
            .map(|(name, _)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.reactions.values().all(Vec::is_empty)
    }

    /// Merge another set of reactions into this one.
    pub fn extend(&mut self, other: &ReactionOptions) {
        for (event_name, reactions) in &other.reactions {
            self.reactions
                .entry(event_name.clone())
                .or_default()
                .extend(reactions.iter().cloned());
        }
    }
}

impl std::fmt::Debug for ReactionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (name, reactions) in &self.reactions {
            map.entry(name, &reactions.len());
        }
        map.finish()
    }
}

/// Outbound notification bound to a monitor's alerts. The channel name
/// selects the notification class; `params` is channel-specific.
#[derive(Debug, Clone)]
pub struct NotificationSpec {
    pub channel: String,
    pub min_priority_to_send: Priority,
    /// Recipients to mention when the alert reaches the channel.
    pub mentions: Vec<String>,
    pub params: serde_json::Value,
}

impl NotificationSpec {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            min_priority_to_send: Priority::Informational,
            mentions: Vec::new(),
            params: serde_json::Value::Null,
        }
    }
}

/// Everything the engine needs to run one monitor.
#[derive(Clone)]
pub struct MonitorDefinition {
    pub monitor_options: MonitorOptions,
    pub issue_options: IssueOptions,
    pub alert_options: Option<AlertOptions>,
    pub reaction_options: ReactionOptions,
    pub notification_options: Vec<NotificationSpec>,
    pub code: Arc<dyn MonitorCode>,
    /// Opaque source descriptor persisted with the monitor row.
    pub source: String,
}

impl MonitorDefinition {
    /// Hash of the source descriptor, persisted as the monitor version.
    pub fn version_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl std::fmt::Debug for MonitorDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorDefinition")
            .field("monitor_options", &self.monitor_options)
            .field("issue_options", &self.issue_options)
            .field("alert_options", &self.alert_options)
            .field("reaction_options", &self.reaction_options)
            .field("notification_options", &self.notification_options)
            .field("source", &self.source)
            .finish()
    }
}
