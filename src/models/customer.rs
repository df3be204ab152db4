use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A customer kept by one user.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub cust_id: i32,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub cust_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "crate::auth::user::Entity",
        from = "Column::UserId",
        to = "crate::auth::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
    #[sea_orm(has_many = "super::store_visit::Entity")]
    StoreVisit,
    #[sea_orm(has_many = "super::home_delivery_order::Entity")]
    HomeDeliveryOrder,
}

impl Related<crate::auth::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::store_visit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StoreVisit.def()
    }
}

impl Related<super::home_delivery_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::HomeDeliveryOrder.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
