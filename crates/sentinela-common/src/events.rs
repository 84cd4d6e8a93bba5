//! The closed set of lifecycle event names.

pub const ALERT_ACKNOWLEDGE_DISMISSED: &str = "alert_acknowledge_dismissed";
pub const ALERT_ACKNOWLEDGED: &str = "alert_acknowledged";
pub const ALERT_CREATED: &str = "alert_created";
pub const ALERT_ISSUES_LINKED: &str = "alert_issues_linked";
pub const ALERT_LOCKED: &str = "alert_locked";
pub const ALERT_PRIORITY_DECREASED: &str = "alert_priority_decreased";
pub const ALERT_PRIORITY_INCREASED: &str = "alert_priority_increased";
pub const ALERT_SOLVED: &str = "alert_solved";
pub const ALERT_UNLOCKED: &str = "alert_unlocked";
pub const ALERT_UPDATED: &str = "alert_updated";

pub const ISSUE_CREATED: &str = "issue_created";
pub const ISSUE_DROPPED: &str = "issue_dropped";
pub const ISSUE_LINKED: &str = "issue_linked";
pub const ISSUE_SOLVED: &str = "issue_solved";
pub const ISSUE_UPDATED_NOT_SOLVED: &str = "issue_updated_not_solved";
pub const ISSUE_UPDATED_SOLVED: &str = "issue_updated_solved";

pub const MONITOR_ENABLED_CHANGED: &str = "monitor_enabled_changed";
pub const MONITOR_EXECUTION_ERROR: &str = "monitor_execution_error";
pub const MONITOR_EXECUTION_SUCCESS: &str = "monitor_execution_success";
pub const MONITOR_STUCK: &str = "monitor_stuck";

pub const NOTIFICATION_CLOSED: &str = "notification_closed";
pub const NOTIFICATION_CREATED: &str = "notification_created";

/// Every event name the engine emits. Reactions may only bind to these.
pub const ALL: &[&str] = &[
    ALERT_ACKNOWLEDGE_DISMISSED,
    ALERT_ACKNOWLEDGED,
    ALERT_CREATED,
    ALERT_ISSUES_LINKED,
    ALERT_LOCKED,
    ALERT_PRIORITY_DECREASED,
    ALERT_PRIORITY_INCREASED,
    ALERT_SOLVED,
    ALERT_UNLOCKED,
    ALERT_UPDATED,
    ISSUE_CREATED,
    ISSUE_DROPPED,
    ISSUE_LINKED,
    ISSUE_SOLVED,
    ISSUE_UPDATED_NOT_SOLVED,
    ISSUE_UPDATED_SOLVED,
    MONITOR_ENABLED_CHANGED,
    MONITOR_EXECUTION_ERROR,
    MONITOR_EXECUTION_SUCCESS,
    MONITOR_STUCK,
    NOTIFICATION_CLOSED,
    NOTIFICATION_CREATED,
];

pub fn is_known_event(name: &str) -> bool {
    ALL.contains(&name)
}
