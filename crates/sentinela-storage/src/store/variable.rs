use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder,
};

use crate::entities::variable::{self, Column, Entity};
use crate::error::Result;
use crate::store::Store;

impl Store {
    /// Read a per-monitor variable. Only the owning monitor's callbacks
    /// should reach these.
    pub async fn get_variable(&self, monitor_id: i64, name: &str) -> Result<Option<String>> {
        let model = Entity::find()
            .filter(Column::MonitorId.eq(monitor_id))
            .filter(Column::Name.eq(name))
            .one(self.db())
            .await?;
        Ok(model.and_then(|m| m.value))
    }

    /// Write a per-monitor variable, creating it when missing. `None`
    /// stores an explicit empty value.
    pub async fn set_variable(
        &self,
        monitor_id: i64,
        name: &str,
        value: Option<String>,
    ) -> Result<()> {
        let now = Utc::now().fixed_offset();
        let existing = Entity::find()
            .filter(Column::MonitorId.eq(monitor_id))
            .filter(Column::Name.eq(name))
            .one(self.db())
            .await?;

        match existing {
            Some(model) => {
                let mut am: variable::ActiveModel = model.into();
                am.value = Set(value);
                am.updated_at = Set(now);
                am.update(self.db()).await?;
            }
            None => {
                let am = variable::ActiveModel {
                    monitor_id: Set(monitor_id),
                    name: Set(name.to_string()),
                    value: Set(value),
                    updated_at: Set(now),
                    ..Default::default()
                };
                am.insert(self.db()).await?;
            }
        }
        Ok(())
    }

    pub async fn list_variables(&self, monitor_id: i64) -> Result<Vec<(String, Option<String>)>> {
        let models = Entity::find()
            .filter(Column::MonitorId.eq(monitor_id))
            .order_by(Column::Name, Order::Asc)
            .all(self.db())
            .await?;
        Ok(models.into_iter().map(|m| (m.name, m.value)).collect())
    }
}
