use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use sentinela_common::types::EventPayload;
use serde::{Deserialize, Serialize};

use crate::entities::event::{self, Column, Entity};
use crate::error::Result;
use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    pub id: i64,
    pub event_source: String,
    pub event_source_id: i64,
    pub event_source_monitor_id: i64,
    pub event_name: String,
    pub payload: serde_json::Value,
    pub pending_publish: bool,
    pub created_at: DateTime<Utc>,
}

impl EventRow {
    pub fn to_payload(&self) -> Result<EventPayload> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

fn to_row(m: event::Model) -> EventRow {
    EventRow {
        id: m.id,
        event_source: m.event_source,
        event_source_id: m.event_source_id,
        event_source_monitor_id: m.event_source_monitor_id,
        event_name: m.event_name,
        payload: m.payload,
        pending_publish: m.pending_publish,
        created_at: m.created_at.with_timezone(&Utc),
    }
}

impl Store {
    /// Append a lifecycle event within the caller's transaction.
    ///
    /// The row is only written when a reaction is registered for it
    /// (flagged `pending_publish` for the outbox) or when
    /// `log_all_events` is set. The event is always logged.
    pub(crate) async fn emit_event<C: ConnectionTrait>(
        &self,
        conn: &C,
        event_source: &str,
        event_source_id: i64,
        monitor_id: i64,
        event_name: &str,
        event_data: serde_json::Value,
        extra_payload: Option<serde_json::Value>,
    ) -> Result<()> {
        let payload = EventPayload {
            event_source: event_source.to_string(),
            event_source_id,
            event_source_monitor_id: monitor_id,
            event_name: event_name.to_string(),
            event_data,
            extra_payload,
        };

        tracing::info!(
            monitor_id,
            event_source,
            event_source_id,
            event_name,
            "Event emitted"
        );

        let has_reaction = self.reactions.has_reaction(monitor_id, event_name);
        if !has_reaction && !self.log_all_events {
            return Ok(());
        }

        let am = event::ActiveModel {
            event_source: Set(payload.event_source.clone()),
            event_source_id: Set(event_source_id),
            event_source_monitor_id: Set(monitor_id),
            event_name: Set(payload.event_name.clone()),
            payload: Set(serde_json::to_value(&payload)?),
            pending_publish: Set(has_reaction),
            created_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };
        am.insert(conn).await?;
        Ok(())
    }

    /// Events waiting for outbox publication, oldest first.
    pub async fn pending_events(&self, limit: u64) -> Result<Vec<EventRow>> {
        let rows = Entity::find()
            .filter(Column::PendingPublish.eq(true))
            .order_by(Column::Id, Order::Asc)
            .limit(limit)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    /// Clear the pending flag once the event message is enqueued.
    pub async fn mark_event_published(&self, event_id: i64) -> Result<()> {
        Entity::update_many()
            .col_expr(Column::PendingPublish, Expr::value(false))
            .filter(Column::Id.eq(event_id))
            .exec(self.db())
            .await?;
        Ok(())
    }

    /// Delete events older than the cutoff. Returns the removed count.
    pub async fn delete_events_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = Entity::delete_many()
            .filter(Column::CreatedAt.lt(cutoff.fixed_offset()))
            .filter(Column::PendingPublish.eq(false))
            .exec(self.db())
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn count_events(&self) -> Result<u64> {
        Ok(Entity::find().count(self.db()).await?)
    }

    /// Events of one monitor filtered by name, newest last.
    pub async fn list_events(&self, monitor_id: i64, event_name: &str) -> Result<Vec<EventRow>> {
        let rows = Entity::find()
            .filter(Column::EventSourceMonitorId.eq(monitor_id))
            .filter(Column::EventName.eq(event_name))
            .order_by(Column::Id, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }
}
