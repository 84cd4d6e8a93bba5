use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "monitors")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,
    pub enabled: bool,
    pub queued: bool,
    pub running: bool,
    pub queued_at: Option<DateTimeWithTimeZone>,
    pub running_at: Option<DateTimeWithTimeZone>,
    pub search_executed_at: Option<DateTimeWithTimeZone>,
    pub update_executed_at: Option<DateTimeWithTimeZone>,
    pub last_heartbeat: Option<DateTimeWithTimeZone>,
    pub last_successful_execution: Option<DateTimeWithTimeZone>,
    pub source: String,
    pub version_hash: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
