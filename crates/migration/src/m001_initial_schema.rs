use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Monitors::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Monitors::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Monitors::Name).string().not_null().unique_key())
                    .col(ColumnDef::new(Monitors::Enabled).boolean().not_null().default(true))
                    .col(ColumnDef::new(Monitors::Queued).boolean().not_null().default(false))
                    .col(ColumnDef::new(Monitors::Running).boolean().not_null().default(false))
                    .col(ColumnDef::new(Monitors::QueuedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Monitors::RunningAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Monitors::SearchExecutedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Monitors::UpdateExecutedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Monitors::LastHeartbeat).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Monitors::LastSuccessfulExecution)
                            .timestamp_with_time_zone(),
                    )
                    .col(ColumnDef::new(Monitors::Source).text().not_null())
                    .col(ColumnDef::new(Monitors::VersionHash).string().not_null())
                    .col(ColumnDef::new(Monitors::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Monitors::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_monitors_enabled_queued_running")
                    .table(Monitors::Table)
                    .col(Monitors::Enabled)
                    .col(Monitors::Queued)
                    .col(Monitors::Running)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Issues::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Issues::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Issues::MonitorId).big_integer().not_null())
                    .col(ColumnDef::new(Issues::AlertId).big_integer())
                    .col(ColumnDef::new(Issues::ModelId).string().not_null())
                    .col(ColumnDef::new(Issues::Status).string().not_null())
                    .col(ColumnDef::new(Issues::Data).json().not_null())
                    .col(ColumnDef::new(Issues::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Issues::SolvedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Issues::DroppedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_issues_monitor_status_model")
                    .table(Issues::Table)
                    .col(Issues::MonitorId)
                    .col(Issues::Status)
                    .col(Issues::ModelId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_issues_alert_status")
                    .table(Issues::Table)
                    .col(Issues::AlertId)
                    .col(Issues::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Alerts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alerts::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Alerts::MonitorId).big_integer().not_null())
                    .col(ColumnDef::new(Alerts::Status).string().not_null())
                    .col(ColumnDef::new(Alerts::Priority).small_integer())
                    .col(
                        ColumnDef::new(Alerts::Acknowledged)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Alerts::AcknowledgePriority).small_integer())
                    .col(ColumnDef::new(Alerts::Locked).boolean().not_null().default(false))
                    .col(ColumnDef::new(Alerts::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Alerts::SolvedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_alerts_monitor_status_locked")
                    .table(Alerts::Table)
                    .col(Alerts::MonitorId)
                    .col(Alerts::Status)
                    .col(Alerts::Locked)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Notifications::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Notifications::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Notifications::MonitorId).big_integer().not_null())
                    .col(ColumnDef::new(Notifications::AlertId).big_integer().not_null())
                    .col(ColumnDef::new(Notifications::Channel).string().not_null())
                    .col(ColumnDef::new(Notifications::Target).string().not_null())
                    .col(ColumnDef::new(Notifications::Status).string().not_null())
                    .col(ColumnDef::new(Notifications::Data).json())
                    .col(
                        ColumnDef::new(Notifications::MinPriorityToSend)
                            .small_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Notifications::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Notifications::ClosedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_notifications_alert_status")
                    .table(Notifications::Table)
                    .col(Notifications::AlertId)
                    .col(Notifications::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Events::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Events::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Events::EventSource).string().not_null())
                    .col(ColumnDef::new(Events::EventSourceId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Events::EventSourceMonitorId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Events::EventName).string().not_null())
                    .col(ColumnDef::new(Events::Payload).json().not_null())
                    .col(
                        ColumnDef::new(Events::PendingPublish)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Events::CreatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_events_monitor_name_created")
                    .table(Events::Table)
                    .col(Events::EventSourceMonitorId)
                    .col(Events::EventName)
                    .col(Events::CreatedAt)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_events_pending_publish")
                    .table(Events::Table)
                    .col(Events::PendingPublish)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Variables::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Variables::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Variables::MonitorId).big_integer().not_null())
                    .col(ColumnDef::new(Variables::Name).string().not_null())
                    .col(ColumnDef::new(Variables::Value).text())
                    .col(ColumnDef::new(Variables::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_variables_monitor_name")
                    .table(Variables::Table)
                    .col(Variables::MonitorId)
                    .col(Variables::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MonitorExecutions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MonitorExecutions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(MonitorExecutions::MonitorId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MonitorExecutions::Tasks).string().not_null())
                    .col(ColumnDef::new(MonitorExecutions::Status).string().not_null())
                    .col(ColumnDef::new(MonitorExecutions::Error).text())
                    .col(
                        ColumnDef::new(MonitorExecutions::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MonitorExecutions::FinishedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_monitor_executions_monitor_finished")
                    .table(MonitorExecutions::Table)
                    .col(MonitorExecutions::MonitorId)
                    .col(MonitorExecutions::FinishedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MonitorExecutions::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Variables::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Events::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Notifications::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Alerts::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Issues::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Monitors::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Monitors {
    Table,
    Id,
    Name,
    Enabled,
    Queued,
    Running,
    QueuedAt,
    RunningAt,
    SearchExecutedAt,
    UpdateExecutedAt,
    LastHeartbeat,
    LastSuccessfulExecution,
    Source,
    VersionHash,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Issues {
    Table,
    Id,
    MonitorId,
    AlertId,
    ModelId,
    Status,
    Data,
    CreatedAt,
    SolvedAt,
    DroppedAt,
}

#[derive(DeriveIden)]
enum Alerts {
    Table,
    Id,
    MonitorId,
    Status,
    Priority,
    Acknowledged,
    AcknowledgePriority,
    Locked,
    CreatedAt,
    SolvedAt,
}

#[derive(DeriveIden)]
enum Notifications {
    Table,
    Id,
    MonitorId,
    AlertId,
    Channel,
    Target,
    Status,
    Data,
    MinPriorityToSend,
    CreatedAt,
    ClosedAt,
}

#[derive(DeriveIden)]
enum Events {
    Table,
    Id,
    EventSource,
    EventSourceId,
    EventSourceMonitorId,
    EventName,
    Payload,
    PendingPublish,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Variables {
    Table,
    Id,
    MonitorId,
    Name,
    Value,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum MonitorExecutions {
    Table,
    Id,
    MonitorId,
    Tasks,
    Status,
    Error,
    StartedAt,
    FinishedAt,
}
