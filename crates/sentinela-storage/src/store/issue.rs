use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, Order,
    QueryFilter, QueryOrder, TransactionTrait,
};
use sentinela_common::events;
use sentinela_common::types::IssueStatus;
use serde::{Deserialize, Serialize};

use crate::entities::issue::{self, Column, Entity};
use crate::error::{Result, StorageError};
use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRow {
    pub id: i64,
    pub monitor_id: i64,
    pub alert_id: Option<i64>,
    pub model_id: String,
    pub status: IssueStatus,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub solved_at: Option<DateTime<Utc>>,
    pub dropped_at: Option<DateTime<Utc>>,
}

pub(crate) fn to_row(m: issue::Model) -> Result<IssueRow> {
    let status = m
        .status
        .parse::<IssueStatus>()
        .map_err(|_| StorageError::InvalidColumn {
            column: "issues.status",
            value: m.status.clone(),
        })?;
    Ok(IssueRow {
        id: m.id,
        monitor_id: m.monitor_id,
        alert_id: m.alert_id,
        model_id: m.model_id,
        status,
        data: m.data,
        created_at: m.created_at.with_timezone(&Utc),
        solved_at: m.solved_at.map(|t| t.with_timezone(&Utc)),
        dropped_at: m.dropped_at.map(|t| t.with_timezone(&Utc)),
    })
}

fn rows(models: Vec<issue::Model>) -> Result<Vec<IssueRow>> {
    models.into_iter().map(to_row).collect()
}

impl Store {
    pub async fn get_issue(&self, issue_id: i64) -> Result<Option<IssueRow>> {
        let model = Entity::find_by_id(issue_id).one(self.db()).await?;
        model.map(to_row).transpose()
    }

    /// Active issues of a monitor, in creation order.
    pub async fn active_issues(&self, monitor_id: i64) -> Result<Vec<IssueRow>> {
        let models = Entity::find()
            .filter(Column::MonitorId.eq(monitor_id))
            .filter(Column::Status.eq(IssueStatus::Active.to_string()))
            .order_by(Column::Id, Order::Asc)
            .all(self.db())
            .await?;
        rows(models)
    }

    /// Active issues not yet linked to any alert.
    pub(crate) async fn unlinked_active_issues<C: ConnectionTrait>(
        &self,
        conn: &C,
        monitor_id: i64,
    ) -> Result<Vec<IssueRow>> {
        let models = Entity::find()
            .filter(Column::MonitorId.eq(monitor_id))
            .filter(Column::Status.eq(IssueStatus::Active.to_string()))
            .filter(Column::AlertId.is_null())
            .order_by(Column::Id, Order::Asc)
            .all(conn)
            .await?;
        rows(models)
    }

    pub(crate) async fn active_issues_for_alert<C: ConnectionTrait>(
        &self,
        conn: &C,
        alert_id: i64,
    ) -> Result<Vec<IssueRow>> {
        let models = Entity::find()
            .filter(Column::AlertId.eq(alert_id))
            .filter(Column::Status.eq(IssueStatus::Active.to_string()))
            .order_by(Column::Id, Order::Asc)
            .all(conn)
            .await?;
        rows(models)
    }

    /// Create the issue identified by (monitor, model_id) unless the
    /// uniqueness rules forbid it. Returns the row and whether it was
    /// created now.
    ///
    /// An active issue with the same model id always wins; with
    /// `unique` set, a terminal issue also blocks re-creation.
    pub async fn upsert_issue(
        &self,
        monitor_id: i64,
        model_id: &str,
        data: serde_json::Value,
        unique: bool,
    ) -> Result<(IssueRow, bool)> {
        let txn = self.db().begin().await?;

        let existing = Entity::find()
            .filter(Column::MonitorId.eq(monitor_id))
            .filter(Column::ModelId.eq(model_id))
            .order_by(Column::Id, Order::Desc)
            .all(&txn)
            .await?;

        if let Some(active) = existing
            .iter()
            .find(|m| m.status == IssueStatus::Active.to_string())
        {
            let row = to_row(active.clone())?;
            txn.commit().await?;
            return Ok((row, false));
        }
        if unique {
            if let Some(terminal) = existing.into_iter().next() {
                let row = to_row(terminal)?;
                txn.commit().await?;
                return Ok((row, false));
            }
        }

        let am = issue::ActiveModel {
            monitor_id: Set(monitor_id),
            alert_id: Set(None),
            model_id: Set(model_id.to_string()),
            status: Set(IssueStatus::Active.to_string()),
            data: Set(data),
            created_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };
        let created = am.insert(&txn).await?;
        let row = to_row(created)?;

        self.emit_event(
            &txn,
            "issue",
            row.id,
            monitor_id,
            events::ISSUE_CREATED,
            serde_json::to_value(&row)?,
            None,
        )
        .await?;
        txn.commit().await?;

        tracing::debug!(monitor_id, issue_id = row.id, model_id, "Issue created");
        Ok((row, true))
    }

    /// Replace an active issue's payload. Never changes status; the
    /// emitted event distinguishes whether the new data already looks
    /// solved so reactions can treat the two differently.
    pub async fn update_issue_data(
        &self,
        issue_id: i64,
        data: serde_json::Value,
        solved_hint: bool,
    ) -> Result<Option<IssueRow>> {
        let txn = self.db().begin().await?;

        let Some(model) = Entity::find_by_id(issue_id).one(&txn).await? else {
            return Err(StorageError::NotFound {
                entity: "issue",
                id: issue_id,
            });
        };
        if model.status != IssueStatus::Active.to_string() {
            tracing::info!(issue_id, status = %model.status, "Can't update issue data, not active");
            txn.commit().await?;
            return Ok(None);
        }

        let mut am: issue::ActiveModel = model.into();
        am.data = Set(data);
        let updated = am.update(&txn).await?;
        let row = to_row(updated)?;

        let event_name = if solved_hint {
            events::ISSUE_UPDATED_SOLVED
        } else {
            events::ISSUE_UPDATED_NOT_SOLVED
        };
        self.emit_event(
            &txn,
            "issue",
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

    /// Transition an active issue to solved.
    pub async fn mark_issue_solved(&self, issue_id: i64) -> Result<Option<IssueRow>> {
        self.finish_issue(issue_id, IssueStatus::Solved).await
    }

    /// Transition an active issue to dropped.
    pub async fn mark_issue_dropped(&self, issue_id: i64) -> Result<Option<IssueRow>> {
        self.finish_issue(issue_id, IssueStatus::Dropped).await
    }

    async fn finish_issue(&self, issue_id: i64, target: IssueStatus) -> Result<Option<IssueRow>> {
        let txn = self.db().begin().await?;
        let row = self.finish_issue_in(&txn, issue_id, target).await?;
        txn.commit().await?;
        Ok(row)
    }

    /// Terminal transition within an existing transaction. Solved and
    /// dropped are terminal, so non-active issues are left untouched.
    pub(crate) async fn finish_issue_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        issue_id: i64,
        target: IssueStatus,
    ) -> Result<Option<IssueRow>> {
        let Some(model) = Entity::find_by_id(issue_id).one(conn).await? else {
            return Err(StorageError::NotFound {
                entity: "issue",
                id: issue_id,
            });
        };
        if model.status != IssueStatus::Active.to_string() {
            tracing::info!(issue_id, status = %model.status, "Issue already terminal");
            return Ok(None);
        }

        if !target.is_terminal() {
            return Ok(None);
        }

        let now = Utc::now().fixed_offset();
        let mut am: issue::ActiveModel = model.into();
        am.status = Set(target.to_string());
        if target == IssueStatus::Solved {
            am.solved_at = Set(Some(now));
        } else {
            am.dropped_at = Set(Some(now));
        }
        let updated = am.update(conn).await?;
        let row = to_row(updated)?;

        let event_name = match target {
            IssueStatus::Solved => events::ISSUE_SOLVED,
            _ => events::ISSUE_DROPPED,
        };
        self.emit_event(
            conn,
            "issue",
            row.id,
            row.monitor_id,
            event_name,
            serde_json::to_value(&row)?,
            None,
        )
        .await?;
        Ok(Some(row))
    }
}
