use crate::dto::customers::HomeDeliveryForm;
use crate::errors::ServiceError;
use crate::models::customer;
use crate::models::home_delivery_order::{self, Entity as HomeDeliveryOrderEntity};
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{error, info, instrument};

pub const ADDRESS_REQUIRED: &str = "Delivery address is required.";

/// The form's address, or the customer's own address when left blank.
pub fn delivery_address_for(
    customer: &customer::Model,
    form: &HomeDeliveryForm,
) -> Result<String, ServiceError> {
    form.delivery_address
        .clone()
        .or_else(|| {
            customer
                .address
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
        })
        .ok_or_else(|| ServiceError::ValidationError(ADDRESS_REQUIRED.to_string()))
}

#[derive(Debug, Clone)]
pub struct HomeDeliveryService {
    db: Arc<DatabaseConnection>,
}

impl HomeDeliveryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, customer, form), fields(cust_id = customer.cust_id))]
    pub async fn place(
        &self,
        customer: &customer::Model,
        form: &HomeDeliveryForm,
    ) -> Result<home_delivery_order::Model, ServiceError> {
        let delivery_address = delivery_address_for(customer, form)?;

        let order = home_delivery_order::ActiveModel {
            cust_id: Set(customer.cust_id),
            items: Set(form.items.trim().to_string()),
            delivery_address: Set(delivery_address),
            scheduled_for: Set(form.scheduled_for()),
            notes: Set(form.notes.clone()),
            ordered_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            error!("Failed to place home delivery order: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        counter!("shopkeeper.home_delivery_orders.placed", 1);
        info!(order_id = order.id, "Home delivery order placed");
        Ok(order)
    }

    /// Orders of one customer, newest first
    pub async fn list_for_customer(
        &self,
        cust_id: i32,
    ) -> Result<Vec<home_delivery_order::Model>, ServiceError> {
        Ok(HomeDeliveryOrderEntity::find()
            .filter(home_delivery_order::Column::CustId.eq(cust_id))
            .order_by_desc(home_delivery_order::Column::OrderedAt)
            .order_by_desc(home_delivery_order::Column::Id)
            .all(&*self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use uuid::Uuid;

    fn customer(address: Option<&str>) -> customer::Model {
        customer::Model {
            cust_id: 1,
            user_id: Uuid::new_v4(),
            cust_name: "Ada".into(),
            phone: "5550100".into(),
            email: None,
            address: address.map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn address_falls_back_to_customer() {
        let form = HomeDeliveryForm {
            items: "milk".into(),
            ..Default::default()
        };
        assert_eq!(
            delivery_address_for(&customer(Some("1 Main St")), &form).unwrap(),
            "1 Main St"
        );

        let explicit = HomeDeliveryForm {
            delivery_address: Some("2 Side Rd".into()),
            ..form.clone()
        };
        assert_eq!(
            delivery_address_for(&customer(Some("1 Main St")), &explicit).unwrap(),
            "2 Side Rd"
        );

        assert_matches!(
            delivery_address_for(&customer(Some("  ")), &form),
            Err(ServiceError::ValidationError(msg)) if msg == ADDRESS_REQUIRED
        );
    }
}
