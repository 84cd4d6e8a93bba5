use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, Order,
    QueryFilter, QueryOrder, TransactionTrait,
};
use sentinela_alert::{calculate_priority, AlertRule, IssueSnapshot};
use sentinela_common::events;
use sentinela_common::types::{AlertStatus, IssueStatus, Priority};
use serde::{Deserialize, Serialize};

use crate::entities::alert::{self, Column, Entity};
use crate::entities::issue;
use crate::error::{Result, StorageError};
use crate::store::{IssueRow, Store};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRow {
    pub id: i64,
    pub monitor_id: i64,
    pub status: AlertStatus,
    pub priority: Option<Priority>,
    pub acknowledged: bool,
    pub acknowledge_priority: Option<Priority>,
    pub locked: bool,
    pub created_at: DateTime<Utc>,
    pub solved_at: Option<DateTime<Utc>>,
}

fn to_row(m: alert::Model) -> Result<AlertRow> {
    let status = m
        .status
        .parse::<AlertStatus>()
        .map_err(|_| StorageError::InvalidColumn {
            column: "alerts.status",
            value: m.status.clone(),
        })?;
    Ok(AlertRow {
        id: m.id,
        monitor_id: m.monitor_id,
        status,
        priority: m.priority.and_then(Priority::from_level),
        acknowledged: m.acknowledged,
        acknowledge_priority: m.acknowledge_priority.and_then(Priority::from_level),
        locked: m.locked,
        created_at: m.created_at.with_timezone(&Utc),
        solved_at: m.solved_at.map(|t| t.with_timezone(&Utc)),
    })
}

fn snapshots(issues: &[IssueRow]) -> Vec<IssueSnapshot> {
    issues
        .iter()
        .map(|issue| IssueSnapshot {
            id: issue.id,
            created_at: issue.created_at,
            data: issue.data.clone(),
        })
        .collect()
}

/// Urgency rank with `None` below every real priority, for increase /
/// decrease comparisons.
fn rank(priority: Option<Priority>) -> i16 {
    priority.map_or(i16::MAX, Priority::level)
}

impl Store {
    pub async fn get_alert(&self, alert_id: i64) -> Result<Option<AlertRow>> {
        let model = Entity::find_by_id(alert_id).one(self.db()).await?;
        model.map(to_row).transpose()
    }

    /// Active alerts of a monitor, locked ones included.
    pub async fn active_alerts(&self, monitor_id: i64) -> Result<Vec<AlertRow>> {
        let models = Entity::find()
            .filter(Column::MonitorId.eq(monitor_id))
            .filter(Column::Status.eq(AlertStatus::Active.to_string()))
            .order_by(Column::Id, Order::Asc)
            .all(self.db())
            .await?;
        models.into_iter().map(to_row).collect()
    }

    async fn open_alert<C: ConnectionTrait>(
        &self,
        conn: &C,
        monitor_id: i64,
    ) -> Result<Option<AlertRow>> {
        let model = Entity::find()
            .filter(Column::MonitorId.eq(monitor_id))
            .filter(Column::Status.eq(AlertStatus::Active.to_string()))
            .filter(Column::Locked.eq(false))
            .order_by(Column::Id, Order::Asc)
            .one(conn)
            .await?;
        model.map(to_row).transpose()
    }

    /// Recompute the monitor's alert aggregation: create the open alert
    /// when needed, link unlinked active issues, re-evaluate priorities
    /// and solve alerts whose issues are all gone. The whole pass is a
    /// single transaction.
    pub async fn recompute_alert(
        &self,
        monitor_id: i64,
        rule: &AlertRule,
        dismiss_acknowledge_on_new_issues: bool,
    ) -> Result<()> {
        let txn = self.db().begin().await?;
        let now = Utc::now();

        // 1. Active issues not attached to any alert. Locked alerts
        // keep their linked set untouched.
        let unlinked = self.unlinked_active_issues(&txn, monitor_id).await?;

        let mut open = self.open_alert(&txn, monitor_id).await?;

        if !unlinked.is_empty() {
            // 2. Without an open alert, create one, but only when the
            // rule gives the new issues a priority at all.
            if open.is_none() {
                if let Some(priority) = calculate_priority(rule, &snapshots(&unlinked), now) {
                    let am = alert::ActiveModel {
                        monitor_id: Set(monitor_id),
                        status: Set(AlertStatus::Active.to_string()),
                        priority: Set(Some(priority.level())),
                        acknowledged: Set(false),
                        locked: Set(false),
                        created_at: Set(now.fixed_offset()),
                        ..Default::default()
                    };
                    let created = to_row(am.insert(&txn).await?)?;
                    self.emit_event(
                        &txn,
                        "alert",
                        created.id,
                        monitor_id,
                        events::ALERT_CREATED,
                        serde_json::to_value(&created)?,
                        None,
                    )
                    .await?;
                    tracing::debug!(monitor_id, alert_id = created.id, "Alert created");
                    open = Some(created);
                }
            }

            // 3. Link the unlinked issues to the open alert.
            if let Some(alert) = &mut open {
                let issue_ids: Vec<i64> = unlinked.iter().map(|issue| issue.id).collect();
                issue::Entity::update_many()
                    .col_expr(issue::Column::AlertId, Expr::value(alert.id))
                    .filter(issue::Column::Id.is_in(issue_ids.clone()))
                    .exec(&txn)
                    .await?;

                for issue in &unlinked {
                    let mut linked = issue.clone();
                    linked.alert_id = Some(alert.id);
                    self.emit_event(
                        &txn,
                        "issue",
                        linked.id,
                        monitor_id,
                        events::ISSUE_LINKED,
                        serde_json::to_value(&linked)?,
                        None,
                    )
                    .await?;
                }
                self.emit_event(
                    &txn,
                    "alert",
                    alert.id,
                    monitor_id,
                    events::ALERT_ISSUES_LINKED,
                    serde_json::to_value(&*alert)?,
                    Some(serde_json::json!({ "issues_ids": issue_ids })),
                )
                .await?;
                tracing::debug!(monitor_id, alert_id = alert.id, ?issue_ids, "Issues linked");

                if dismiss_acknowledge_on_new_issues && alert.acknowledged {
                    self.dismiss_acknowledge_in(&txn, alert).await?;
                }
            }
        }

        // 4/5. Re-evaluate every active alert of the monitor.
        let models = Entity::find()
            .filter(Column::MonitorId.eq(monitor_id))
            .filter(Column::Status.eq(AlertStatus::Active.to_string()))
            .order_by(Column::Id, Order::Asc)
            .all(&txn)
            .await?;

        for model in models {
            let mut row = to_row(model)?;
            let active_issues = self.active_issues_for_alert(&txn, row.id).await?;

            let new_priority = calculate_priority(rule, &snapshots(&active_issues), now);
            if new_priority != row.priority {
                let previous = row.priority;
                let increased = rank(new_priority) < rank(previous);

                Entity::update_many()
                    .col_expr(
                        Column::Priority,
                        Expr::value(new_priority.map(Priority::level)),
                    )
                    .filter(Column::Id.eq(row.id))
                    .exec(&txn)
                    .await?;
                row.priority = new_priority;

                let event_name = if increased {
                    events::ALERT_PRIORITY_INCREASED
                } else {
                    events::ALERT_PRIORITY_DECREASED
                };
                self.emit_event(
                    &txn,
                    "alert",
                    row.id,
                    monitor_id,
                    event_name,
                    serde_json::to_value(&row)?,
                    Some(serde_json::json!({ "previous_priority": previous })),
                )
                .await?;

                // An increase past the acknowledged level voids the
                // acknowledgement.
                if increased && row.acknowledged && rank(new_priority) < rank(row.acknowledge_priority)
                {
                    self.dismiss_acknowledge_in(&txn, &mut row).await?;
                }
            }

            if active_issues.is_empty() {
                self.solve_alert_in(&txn, &mut row).await?;
            } else {
                self.emit_event(
                    &txn,
                    "alert",
                    row.id,
                    monitor_id,
                    events::ALERT_UPDATED,
                    serde_json::to_value(&row)?,
                    None,
                )
                .await?;
            }
        }

        txn.commit().await?;
        Ok(())
    }

    async fn dismiss_acknowledge_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        alert: &mut AlertRow,
    ) -> Result<()> {
        Entity::update_many()
            .col_expr(Column::Acknowledged, Expr::value(false))
            .col_expr(Column::AcknowledgePriority, Expr::value(None::<i16>))
            .filter(Column::Id.eq(alert.id))
            .exec(conn)
            .await?;
        alert.acknowledged = false;
        alert.acknowledge_priority = None;

        self.emit_event(
            conn,
            "alert",
            alert.id,
            alert.monitor_id,
            events::ALERT_ACKNOWLEDGE_DISMISSED,
            serde_json::to_value(&*alert)?,
            None,
        )
        .await?;
        tracing::debug!(alert_id = alert.id, "Acknowledgement dismissed");
        Ok(())
    }

    async fn solve_alert_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        alert: &mut AlertRow,
    ) -> Result<()> {
        let now = Utc::now().fixed_offset();
        Entity::update_many()
            .col_expr(Column::Status, Expr::value(AlertStatus::Solved.to_string()))
            .col_expr(Column::SolvedAt, Expr::value(Some(now)))
            .filter(Column::Id.eq(alert.id))
            .filter(Column::Status.eq(AlertStatus::Active.to_string()))
            .exec(conn)
            .await?;
        alert.status = AlertStatus::Solved;
        alert.solved_at = Some(now.with_timezone(&Utc));

        self.emit_event(
            conn,
            "alert",
            alert.id,
            alert.monitor_id,
            events::ALERT_SOLVED,
            serde_json::to_value(&*alert)?,
            None,
        )
        .await?;
        tracing::debug!(alert_id = alert.id, "Alert solved");
        Ok(())
    }

    /// Acknowledge the alert at its current priority.
    pub async fn acknowledge_alert(&self, alert_id: i64) -> Result<Option<AlertRow>> {
        let txn = self.db().begin().await?;
        let Some(model) = Entity::find_by_id(alert_id).one(&txn).await? else {
            return Err(StorageError::NotFound {
                entity: "alert",
                id: alert_id,
            });
        };
        let mut row = to_row(model.clone())?;

        if row.status != AlertStatus::Active {
            tracing::info!(alert_id, status = %row.status, "Can't acknowledge, not active");
            txn.commit().await?;
            return Ok(None);
        }
        // Already acknowledged at this priority or stronger.
        if row.acknowledged && rank(row.acknowledge_priority) <= rank(row.priority) {
            txn.commit().await?;
            return Ok(Some(row));
        }

        let mut am: alert::ActiveModel = model.into();
        am.acknowledged = Set(true);
        am.acknowledge_priority = Set(row.priority.map(Priority::level));
        let updated = am.update(&txn).await?;
        row = to_row(updated)?;

        self.emit_event(
            &txn,
            "alert",
            row.id,
            row.monitor_id,
            events::ALERT_ACKNOWLEDGED,
            serde_json::to_value(&row)?,
            None,
        )
        .await?;
        txn.commit().await?;
        Ok(Some(row))
    }

    /// Lock the alert: it accepts no new issue links until unlocked.
    pub async fn lock_alert(&self, alert_id: i64) -> Result<Option<AlertRow>> {
        self.set_alert_locked(alert_id, true).await
    }

    pub async fn unlock_alert(&self, alert_id: i64) -> Result<Option<AlertRow>> {
        self.set_alert_locked(alert_id, false).await
    }

    async fn set_alert_locked(&self, alert_id: i64, locked: bool) -> Result<Option<AlertRow>> {
        let txn = self.db().begin().await?;
        let Some(model) = Entity::find_by_id(alert_id).one(&txn).await? else {
            return Err(StorageError::NotFound {
                entity: "alert",
                id: alert_id,
            });
        };
        let row = to_row(model.clone())?;

        if row.status != AlertStatus::Active {
            tracing::info!(alert_id, status = %row.status, "Can't change lock, not active");
            txn.commit().await?;
            return Ok(None);
        }
        if row.locked == locked {
            txn.commit().await?;
            return Ok(Some(row));
        }

        let mut am: alert::ActiveModel = model.into();
        am.locked = Set(locked);
        let updated = am.update(&txn).await?;
        let row = to_row(updated)?;

        let event_name = if locked {
            events::ALERT_LOCKED
        } else {
            events::ALERT_UNLOCKED
        };
        self.emit_event(
            &txn,
            "alert",
            row.id,
            row.monitor_id,
            event_name,
            serde_json::to_value(&row)?,
            None,
        )
        .await?;
        txn.commit().await?;
        Ok(Some(row))
    }

    /// Manually solve an alert by solving all of its active issues.
    ///
    /// Refused for monitors with solvable issues: their issues would be
    /// re-evaluated (and likely re-opened) by the next update pass.
    /// Returns whether the alert was solved.
    pub async fn solve_alert(&self, alert_id: i64, issues_solvable: bool) -> Result<bool> {
        let txn = self.db().begin().await?;
        let Some(model) = Entity::find_by_id(alert_id).one(&txn).await? else {
            return Err(StorageError::NotFound {
                entity: "alert",
                id: alert_id,
            });
        };
        let mut row = to_row(model.clone())?;

        if row.status != AlertStatus::Active {
            tracing::info!(alert_id, status = %row.status, "Can't solve, not active");
            txn.commit().await?;
            return Ok(false);
        }
        if issues_solvable {
            tracing::info!(alert_id, "Tried to solve an alert with solvable issues, skipping");
            txn.commit().await?;
            return Ok(false);
        }

        let active_issues = self.active_issues_for_alert(&txn, alert_id).await?;
        for issue in &active_issues {
            self.finish_issue_in(&txn, issue.id, IssueStatus::Solved)
                .await?;
        }

        // Acknowledge silently so the closure does not fan out as a
        // fresh acknowledgement notification.
        let mut am: alert::ActiveModel = model.into();
        am.acknowledged = Set(true);
        am.acknowledge_priority = Set(row.priority.map(Priority::level));
        let updated = am.update(&txn).await?;
        row = to_row(updated)?;

        self.solve_alert_in(&txn, &mut row).await?;
        txn.commit().await?;
        Ok(true)
    }
}
