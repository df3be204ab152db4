use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "home_delivery_orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub cust_id: i32,
    /// Free-form list of ordered items, one per line
    #[sea_orm(column_type = "Text")]
    pub items: String,
    pub delivery_address: String,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub ordered_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustId",
        to = "super::customer::Column::CustId",
        on_delete = "Cascade"
    )]
    Customer,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
