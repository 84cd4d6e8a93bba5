use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, EntityTrait, Order, QueryFilter,
    QueryOrder, TransactionTrait,
};
use sentinela_common::events;
use sentinela_common::types::{RunKind, RunOutcome, RunToken};
use serde::{Deserialize, Serialize};

use crate::entities::monitor::{self, Column, Entity};
use crate::entities::monitor_execution;
use crate::error::{Result, StorageError};
use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorRow {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    pub queued: bool,
    pub running: bool,
    pub queued_at: Option<DateTime<Utc>>,
    pub running_at: Option<DateTime<Utc>>,
    pub search_executed_at: Option<DateTime<Utc>>,
    pub update_executed_at: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_successful_execution: Option<DateTime<Utc>>,
    pub source: String,
    pub version_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorExecutionRow {
    pub id: i64,
    pub monitor_id: i64,
    pub tasks: String,
    pub status: String,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

fn to_row(m: monitor::Model) -> MonitorRow {
    MonitorRow {
        id: m.id,
        name: m.name,
        enabled: m.enabled,
        queued: m.queued,
        running: m.running,
        queued_at: m.queued_at.map(|t| t.with_timezone(&Utc)),
        running_at: m.running_at.map(|t| t.with_timezone(&Utc)),
        search_executed_at: m.search_executed_at.map(|t| t.with_timezone(&Utc)),
        update_executed_at: m.update_executed_at.map(|t| t.with_timezone(&Utc)),
        last_heartbeat: m.last_heartbeat.map(|t| t.with_timezone(&Utc)),
        last_successful_execution: m.last_successful_execution.map(|t| t.with_timezone(&Utc)),
        source: m.source,
        version_hash: m.version_hash,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

fn tasks_string(tasks: &[RunKind]) -> String {
    tasks
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

impl Store {
    /// Create or refresh a monitor registration. The name must already
    /// be normalized. Existing monitors keep their enabled flag and
    /// runtime state; only the source descriptor is refreshed.
    pub async fn register_monitor(
        &self,
        name: &str,
        source: &str,
        version_hash: &str,
    ) -> Result<MonitorRow> {
        let now = Utc::now().fixed_offset();

        if let Some(existing) = Entity::find()
            .filter(Column::Name.eq(name))
            .one(self.db())
            .await?
        {
            if existing.source == source && existing.version_hash == version_hash {
                return Ok(to_row(existing));
            }
            let mut am: monitor::ActiveModel = existing.into();
            am.source = Set(source.to_string());
            am.version_hash = Set(version_hash.to_string());
            am.updated_at = Set(now);
            let updated = am.update(self.db()).await?;
            tracing::info!(monitor = %updated.name, "Monitor registration refreshed");
            return Ok(to_row(updated));
        }

        let am = monitor::ActiveModel {
            name: Set(name.to_string()),
            enabled: Set(true),
            queued: Set(false),
            running: Set(false),
            source: Set(source.to_string()),
            version_hash: Set(version_hash.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let created = am.insert(self.db()).await?;
        tracing::info!(monitor = %created.name, id = created.id, "Monitor registered");
        Ok(to_row(created))
    }

    pub async fn get_monitor(&self, monitor_id: i64) -> Result<Option<MonitorRow>> {
        let model = Entity::find_by_id(monitor_id).one(self.db()).await?;
        Ok(model.map(to_row))
    }

    pub async fn get_monitor_by_name(&self, name: &str) -> Result<Option<MonitorRow>> {
        let model = Entity::find()
            .filter(Column::Name.eq(name))
            .one(self.db())
            .await?;
        Ok(model.map(to_row))
    }

    pub async fn list_monitors(&self) -> Result<Vec<MonitorRow>> {
        let rows = Entity::find()
            .order_by(Column::Name, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    pub async fn list_enabled_monitors(&self) -> Result<Vec<MonitorRow>> {
        let rows = Entity::find()
            .filter(Column::Enabled.eq(true))
            .order_by(Column::Id, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    /// Flip the enabled flag, emitting `monitor_enabled_changed`.
    /// Monitors are never deleted; disabling is the terminal cleanup.
    pub async fn set_monitor_enabled(&self, monitor_id: i64, enabled: bool) -> Result<MonitorRow> {
        let model = Entity::find_by_id(monitor_id)
            .one(self.db())
            .await?
            .ok_or(StorageError::NotFound {
                entity: "monitor",
                id: monitor_id,
            })?;

        if model.enabled == enabled {
            return Ok(to_row(model));
        }

        let txn = self.db().begin().await?;
        let mut am: monitor::ActiveModel = model.into();
        am.enabled = Set(enabled);
        am.updated_at = Set(Utc::now().fixed_offset());
        let updated = am.update(&txn).await?;
        let row = to_row(updated);

        self.emit_event(
            &txn,
            "monitor",
            row.id,
            row.id,
            events::MONITOR_ENABLED_CHANGED,
            serde_json::to_value(&row)?,
            Some(serde_json::json!({ "enabled": enabled })),
        )
        .await?;
        txn.commit().await?;
        Ok(row)
    }

    /// Controller-side claim: mark the monitor queued, only when it is
    /// enabled and not already queued or running. Returns whether this
    /// caller won the claim.
    pub async fn claim_monitor_for_run(&self, monitor_id: i64) -> Result<bool> {
        let now = Utc::now().fixed_offset();
        let result = Entity::update_many()
            .col_expr(Column::Queued, Expr::value(true))
            .col_expr(Column::QueuedAt, Expr::value(now))
            .filter(Column::Id.eq(monitor_id))
            .filter(Column::Enabled.eq(true))
            .filter(Column::Queued.eq(false))
            .filter(Column::Running.eq(false))
            .exec(self.db())
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Undo a claim whose message could not be enqueued.
    pub async fn revert_monitor_claim(&self, monitor_id: i64) -> Result<()> {
        Entity::update_many()
            .col_expr(Column::Queued, Expr::value(false))
            .filter(Column::Id.eq(monitor_id))
            .filter(Column::Running.eq(false))
            .exec(self.db())
            .await?;
        Ok(())
    }

    /// Executor-side start: flip running on the claimed monitor. Fails
    /// with `InvalidState` when another run is already in flight, which
    /// keeps at most one run per monitor.
    pub async fn begin_run(&self, monitor_id: i64) -> Result<RunToken> {
        let now = Utc::now();
        let fixed = now.fixed_offset();
        let result = Entity::update_many()
            .col_expr(Column::Running, Expr::value(true))
            .col_expr(Column::RunningAt, Expr::value(fixed))
            .col_expr(Column::LastHeartbeat, Expr::value(fixed))
            .filter(Column::Id.eq(monitor_id))
            .filter(Column::Queued.eq(true))
            .filter(Column::Running.eq(false))
            .exec(self.db())
            .await?;

        if result.rows_affected != 1 {
            return Err(StorageError::InvalidState(format!(
                "monitor {monitor_id} is not claimable for a run"
            )));
        }

        Ok(RunToken {
            monitor_id,
            started_at: now,
        })
    }

    /// Bump the run heartbeat. A heartbeat on a monitor that is no
    /// longer running (e.g. reset by the stuck procedure) is a no-op.
    pub async fn heartbeat(&self, token: &RunToken, now: DateTime<Utc>) -> Result<()> {
        Entity::update_many()
            .col_expr(Column::LastHeartbeat, Expr::value(now.fixed_offset()))
            .filter(Column::Id.eq(token.monitor_id))
            .filter(Column::Running.eq(true))
            .exec(self.db())
            .await?;
        Ok(())
    }

    /// Finish a run: clear running/queued, record the execution, and
    /// emit the success or error event.
    pub async fn end_run(
        &self,
        token: &RunToken,
        tasks: &[RunKind],
        outcome: RunOutcome,
        error: Option<String>,
    ) -> Result<()> {
        let now = Utc::now();
        let fixed = now.fixed_offset();
        let txn = self.db().begin().await?;

        let mut update = Entity::update_many()
            .col_expr(Column::Running, Expr::value(false))
            .col_expr(Column::Queued, Expr::value(false))
            .filter(Column::Id.eq(token.monitor_id));
        if outcome.is_success() {
            update = update.col_expr(Column::LastSuccessfulExecution, Expr::value(fixed));
        }
        update.exec(&txn).await?;

        let am = monitor_execution::ActiveModel {
            monitor_id: Set(token.monitor_id),
            tasks: Set(tasks_string(tasks)),
            status: Set(outcome.to_string()),
            error: Set(error.clone()),
            started_at: Set(token.started_at.fixed_offset()),
            finished_at: Set(fixed),
            ..Default::default()
        };
        am.insert(&txn).await?;

        let monitor = Entity::find_by_id(token.monitor_id).one(&txn).await?;
        if let Some(monitor) = monitor {
            let row = to_row(monitor);
            let event_name = if outcome.is_success() {
                events::MONITOR_EXECUTION_SUCCESS
            } else {
                events::MONITOR_EXECUTION_ERROR
            };
            self.emit_event(
                &txn,
                "monitor",
                row.id,
                row.id,
                event_name,
                serde_json::to_value(&row)?,
                Some(serde_json::json!({
                    "tasks": tasks_string(tasks),
                    "outcome": outcome.to_string(),
                    "error": error,
                })),
            )
            .await?;
        }

        txn.commit().await?;
        Ok(())
    }

    pub async fn set_search_executed_at(&self, monitor_id: i64, at: DateTime<Utc>) -> Result<()> {
        Entity::update_many()
            .col_expr(Column::SearchExecutedAt, Expr::value(at.fixed_offset()))
            .filter(Column::Id.eq(monitor_id))
            .exec(self.db())
            .await?;
        Ok(())
    }

    pub async fn set_update_executed_at(&self, monitor_id: i64, at: DateTime<Utc>) -> Result<()> {
        Entity::update_many()
            .col_expr(Column::UpdateExecutedAt, Expr::value(at.fixed_offset()))
            .filter(Column::Id.eq(monitor_id))
            .exec(self.db())
            .await?;
        Ok(())
    }

    /// Monitors stuck in a running state: no heartbeat for longer than
    /// the tolerance, falling back to the enqueue time for runs that
    /// never heartbeat.
    pub async fn find_stuck_monitors(&self, time_tolerance: Duration) -> Result<Vec<MonitorRow>> {
        let cutoff = (Utc::now() - time_tolerance).fixed_offset();
        let rows = Entity::find()
            .filter(Column::Running.eq(true))
            .filter(
                Condition::any()
                    .add(Column::LastHeartbeat.lt(cutoff))
                    .add(
                        Condition::all()
                            .add(Column::LastHeartbeat.is_null())
                            .add(Column::QueuedAt.lt(cutoff)),
                    ),
            )
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    /// Reset a stuck monitor so the controller can schedule it again,
    /// emitting `monitor_stuck`.
    pub async fn reset_stuck_monitor(&self, monitor_id: i64) -> Result<()> {
        let txn = self.db().begin().await?;

        let result = Entity::update_many()
            .col_expr(Column::Running, Expr::value(false))
            .col_expr(Column::Queued, Expr::value(false))
            .filter(Column::Id.eq(monitor_id))
            .filter(Column::Running.eq(true))
            .exec(&txn)
            .await?;

        if result.rows_affected == 1 {
            if let Some(monitor) = Entity::find_by_id(monitor_id).one(&txn).await? {
                let row = to_row(monitor);
                self.emit_event(
                    &txn,
                    "monitor",
                    row.id,
                    row.id,
                    events::MONITOR_STUCK,
                    serde_json::to_value(&row)?,
                    None,
                )
                .await?;
                tracing::warn!(monitor = %row.name, id = row.id, "Stuck monitor reset");
            }
        }

        txn.commit().await?;
        Ok(())
    }

    pub async fn list_monitor_executions(
        &self,
        monitor_id: i64,
        limit: u64,
    ) -> Result<Vec<MonitorExecutionRow>> {
        use sea_orm::QuerySelect;

        let rows = monitor_execution::Entity::find()
            .filter(monitor_execution::Column::MonitorId.eq(monitor_id))
            .order_by(monitor_execution::Column::Id, Order::Desc)
            .limit(limit)
            .all(self.db())
            .await?;
        Ok(rows
            .into_iter()
            .map(|m| MonitorExecutionRow {
                id: m.id,
                monitor_id: m.monitor_id,
                tasks: m.tasks,
                status: m.status,
                error: m.error,
                started_at: m.started_at.with_timezone(&Utc),
                finished_at: m.finished_at.with_timezone(&Utc),
            })
            .collect())
    }
}
