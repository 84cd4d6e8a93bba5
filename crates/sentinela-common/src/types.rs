use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert priority levels. Lower numeric level means higher urgency, so the
/// derived ordering sorts `Critical` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical = 1,
    High = 2,
    Moderate = 3,
    Low = 4,
    Informational = 5,
}

impl Priority {
    /// All levels, most urgent first.
    pub const ALL: [Priority; 5] = [
        Priority::Critical,
        Priority::High,
        Priority::Moderate,
        Priority::Low,
        Priority::Informational,
    ];

    /// Numeric level: P1 critical through P5 informational.
    pub fn level(self) -> i16 {
        self as i16
    }

    pub fn from_level(level: i16) -> Option<Priority> {
        match level {
            1 => Some(Priority::Critical),
            2 => Some(Priority::High),
            3 => Some(Priority::Moderate),
            4 => Some(Priority::Low),
            5 => Some(Priority::Informational),
            _ => None,
        }
    }

    /// True when `self` is more urgent than `other`.
    pub fn is_higher_than(self, other: Priority) -> bool {
        self.level() < other.level()
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Critical => write!(f, "critical"),
            Priority::High => write!(f, "high"),
            Priority::Moderate => write!(f, "moderate"),
            Priority::Low => write!(f, "low"),
            Priority::Informational => write!(f, "informational"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "moderate" => Ok(Priority::Moderate),
            "low" => Ok(Priority::Low),
            "informational" => Ok(Priority::Informational),
            _ => Err(format!("unknown priority: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Active,
    Solved,
    Dropped,
}

impl IssueStatus {
    /// Solved and dropped are terminal; no transition leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, IssueStatus::Solved | IssueStatus::Dropped)
    }
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueStatus::Active => write!(f, "active"),
            IssueStatus::Solved => write!(f, "solved"),
            IssueStatus::Dropped => write!(f, "dropped"),
        }
    }
}

impl std::str::FromStr for IssueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(IssueStatus::Active),
            "solved" => Ok(IssueStatus::Solved),
            "dropped" => Ok(IssueStatus::Dropped),
            _ => Err(format!("unknown issue status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Solved,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Active => write!(f, "active"),
            AlertStatus::Solved => write!(f, "solved"),
        }
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AlertStatus::Active),
            "solved" => Ok(AlertStatus::Solved),
            _ => Err(format!("unknown alert status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Active,
    Closed,
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationStatus::Active => write!(f, "active"),
            NotificationStatus::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(NotificationStatus::Active),
            "closed" => Ok(NotificationStatus::Closed),
            _ => Err(format!("unknown notification status: {s}")),
        }
    }
}

/// The two scheduled run kinds of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Search,
    Update,
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunKind::Search => write!(f, "search"),
            RunKind::Update => write!(f, "update"),
        }
    }
}

/// Outcome recorded for a finished monitor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failed,
    Timeout,
    NotRegistered,
}

impl RunOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, RunOutcome::Success)
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Success => write!(f, "success"),
            RunOutcome::Failed => write!(f, "failed"),
            RunOutcome::Timeout => write!(f, "timeout"),
            RunOutcome::NotRegistered => write!(f, "not_registered"),
        }
    }
}

/// Payload carried by every lifecycle event, persisted with the event row
/// and delivered verbatim to reaction callbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    /// Model that generated the event (`monitor`, `issue`, `alert`,
    /// `notification`).
    pub event_source: String,
    /// Primary key of the source row.
    pub event_source_id: i64,
    /// Monitor the source row belongs to.
    pub event_source_monitor_id: i64,
    pub event_name: String,
    /// Snapshot of the source row at emission time.
    pub event_data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_payload: Option<serde_json::Value>,
}

/// Opaque handle returned by `begin_run`, required by `heartbeat` and
/// `end_run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunToken {
    pub monitor_id: i64,
    pub started_at: DateTime<Utc>,
}
