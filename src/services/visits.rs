use crate::dto::customers::StoreVisitForm;
use crate::errors::ServiceError;
use crate::models::customer;
use crate::models::store_visit::{self, Entity as StoreVisitEntity};
use chrono::{Duration, Utc};
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Clock skew tolerated between the browser and the server
const FUTURE_TOLERANCE_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct StoreVisitService {
    db: Arc<DatabaseConnection>,
}

impl StoreVisitService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Records a visit for an already-authorized customer. The visit time
    /// defaults to now and may not lie in the future.
    #[instrument(skip(self, customer, form), fields(cust_id = customer.cust_id))]
    pub async fn record(
        &self,
        customer: &customer::Model,
        form: &StoreVisitForm,
    ) -> Result<store_visit::Model, ServiceError> {
        let now = Utc::now();
        let visited_at = form.visited_at().unwrap_or(now);
        if visited_at > now + Duration::seconds(FUTURE_TOLERANCE_SECS) {
            return Err(ServiceError::ValidationError(
                "Visit time cannot be in the future.".to_string(),
            ));
        }

        let visit = store_visit::ActiveModel {
            cust_id: Set(customer.cust_id),
            visited_at: Set(visited_at),
            temperature: Set(form.temperature()),
            notes: Set(form.notes.clone()),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            error!("Failed to record store visit: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        counter!("shopkeeper.store_visits.recorded", 1);
        info!(visit_id = visit.id, "Store visit recorded");
        Ok(visit)
    }

    /// Visits of one customer, newest first
    pub async fn list_for_customer(
        &self,
        cust_id: i32,
    ) -> Result<Vec<store_visit::Model>, ServiceError> {
        Ok(StoreVisitEntity::find()
            .filter(store_visit::Column::CustId.eq(cust_id))
            .order_by_desc(store_visit::Column::VisitedAt)
            .order_by_desc(store_visit::Column::Id)
            .all(&*self.db)
            .await?)
    }
}
