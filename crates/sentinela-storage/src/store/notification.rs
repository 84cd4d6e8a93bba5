use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder,
    TransactionTrait,
};
use sentinela_common::events;
use sentinela_common::types::{AlertStatus, NotificationStatus, Priority};
use serde::{Deserialize, Serialize};

use crate::entities::alert;
use crate::entities::notification::{self, Column, Entity};
use crate::error::{Result, StorageError};
use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRow {
    pub id: i64,
    pub monitor_id: i64,
    pub alert_id: i64,
    pub channel: String,
    pub target: String,
    pub status: NotificationStatus,
    pub data: Option<serde_json::Value>,
    pub min_priority_to_send: Priority,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

fn to_row(m: notification::Model) -> Result<NotificationRow> {
    let status = m
        .status
        .parse::<NotificationStatus>()
        .map_err(|_| StorageError::InvalidColumn {
            column: "notifications.status",
            value: m.status.clone(),
        })?;
    let min_priority_to_send =
        Priority::from_level(m.min_priority_to_send).ok_or(StorageError::InvalidColumn {
            column: "notifications.min_priority_to_send",
            value: m.min_priority_to_send.to_string(),
        })?;
    Ok(NotificationRow {
        id: m.id,
        monitor_id: m.monitor_id,
        alert_id: m.alert_id,
        channel: m.channel,
        target: m.target,
        status,
        data: m.data,
        min_priority_to_send,
        created_at: m.created_at.with_timezone(&Utc),
        closed_at: m.closed_at.map(|t| t.with_timezone(&Utc)),
    })
}

impl Store {
    pub async fn get_notification(&self, notification_id: i64) -> Result<Option<NotificationRow>> {
        let model = Entity::find_by_id(notification_id).one(self.db()).await?;
        model.map(to_row).transpose()
    }

    /// The active notification of (alert, channel class), if any.
    pub async fn active_notification(
        &self,
        alert_id: i64,
        channel: &str,
    ) -> Result<Option<NotificationRow>> {
        let model = Entity::find()
            .filter(Column::AlertId.eq(alert_id))
            .filter(Column::Channel.eq(channel))
            .filter(Column::Status.eq(NotificationStatus::Active.to_string()))
            .order_by(Column::Id, Order::Asc)
            .one(self.db())
            .await?;
        model.map(to_row).transpose()
    }

    /// Create the notification unless an active one already exists for
    /// (alert, channel class); at most one is active at a time.
    pub async fn create_notification(
        &self,
        monitor_id: i64,
        alert_id: i64,
        channel: &str,
        target: &str,
        min_priority_to_send: Priority,
        data: Option<serde_json::Value>,
    ) -> Result<(NotificationRow, bool)> {
        let txn = self.db().begin().await?;

        let existing = Entity::find()
            .filter(Column::AlertId.eq(alert_id))
            .filter(Column::Channel.eq(channel))
            .filter(Column::Status.eq(NotificationStatus::Active.to_string()))
            .one(&txn)
            .await?;
        if let Some(model) = existing {
            let row = to_row(model)?;
            txn.commit().await?;
            return Ok((row, false));
        }

        let am = notification::ActiveModel {
            monitor_id: Set(monitor_id),
            alert_id: Set(alert_id),
            channel: Set(channel.to_string()),
            target: Set(target.to_string()),
            status: Set(NotificationStatus::Active.to_string()),
            data: Set(data),
            min_priority_to_send: Set(min_priority_to_send.level()),
            created_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };
        let created = am.insert(&txn).await?;
        let row = to_row(created)?;

        self.emit_event(
            &txn,
            "notification",
            row.id,
            monitor_id,
            events::NOTIFICATION_CREATED,
            serde_json::to_value(&row)?,
            None,
        )
        .await?;
        txn.commit().await?;

        tracing::debug!(monitor_id, alert_id, channel, "Notification created");
        Ok((row, true))
    }

    /// Update the opaque target and bookkeeping data of an active
    /// notification (e.g. after the channel allocated a message id).
    pub async fn update_notification_target(
        &self,
        notification_id: i64,
        target: &str,
        data: Option<serde_json::Value>,
    ) -> Result<Option<NotificationRow>> {
        let Some(model) = Entity::find_by_id(notification_id).one(self.db()).await? else {
            return Err(StorageError::NotFound {
                entity: "notification",
                id: notification_id,
            });
        };
        if model.status != NotificationStatus::Active.to_string() {
            return Ok(None);
        }

        let mut am: notification::ActiveModel = model.into();
        am.target = Set(target.to_string());
        if data.is_some() {
            am.data = Set(data);
        }
        let updated = am.update(self.db()).await?;
        Ok(Some(to_row(updated)?))
    }

    /// Close an active notification. Closed is terminal.
    pub async fn close_notification(
        &self,
        notification_id: i64,
    ) -> Result<Option<NotificationRow>> {
        let txn = self.db().begin().await?;
        let Some(model) = Entity::find_by_id(notification_id).one(&txn).await? else {
            return Err(StorageError::NotFound {
                entity: "notification",
                id: notification_id,
            });
        };
        if model.status != NotificationStatus::Active.to_string() {
            tracing::info!(notification_id, status = %model.status, "Notification already closed");
            txn.commit().await?;
            return Ok(None);
        }

        let mut am: notification::ActiveModel = model.into();
        am.status = Set(NotificationStatus::Closed.to_string());
        am.closed_at = Set(Some(Utc::now().fixed_offset()));
        let updated = am.update(&txn).await?;
        let row = to_row(updated)?;

        self.emit_event(
            &txn,
            "notification",
            row.id,
            row.monitor_id,
            events::NOTIFICATION_CLOSED,
            serde_json::to_value(&row)?,
            None,
        )
        .await?;
        txn.commit().await?;

        tracing::debug!(notification_id, "Notification closed");
        Ok(Some(row))
    }

    /// Active notifications whose alert has been solved for longer than
    /// `solved_for`. The janitorial procedure closes these.
    pub async fn notifications_with_alert_solved(
        &self,
        solved_for: Duration,
    ) -> Result<Vec<NotificationRow>> {
        let active = Entity::find()
            .filter(Column::Status.eq(NotificationStatus::Active.to_string()))
            .all(self.db())
            .await?;
        if active.is_empty() {
            return Ok(Vec::new());
        }

        let alert_ids: Vec<i64> = active.iter().map(|n| n.alert_id).collect();
        let cutoff = (Utc::now() - solved_for).fixed_offset();
        let solved_alerts: std::collections::HashSet<i64> = alert::Entity::find()
            .filter(alert::Column::Id.is_in(alert_ids))
            .filter(alert::Column::Status.eq(AlertStatus::Solved.to_string()))
            .filter(alert::Column::SolvedAt.lt(cutoff))
            .all(self.db())
            .await?
            .into_iter()
            .map(|a| a.id)
            .collect();

        active
            .into_iter()
            .filter(|n| solved_alerts.contains(&n.alert_id))
            .map(to_row)
            .collect()
    }
}
