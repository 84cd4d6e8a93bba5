use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "issues")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub monitor_id: i64,
    pub alert_id: Option<i64>,
    pub model_id: String,
    pub status: String,
    pub data: Json,
    pub created_at: DateTimeWithTimeZone,
    pub solved_at: Option<DateTimeWithTimeZone>,
    pub dropped_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
