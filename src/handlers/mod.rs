use crate::auth::{AuthService, PasswordPolicy};
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::services::{
    ContactTracingService, CustomerService, HomeDeliveryService, StoreVisitService,
};
use crate::sessions::SeaOrmStore;
use std::sync::Arc;

pub mod auth;
pub mod common;
pub mod contact_tracing;
pub mod customers;
pub mod deliveries;
pub mod health;
pub mod visits;

/// Services shared by every handler
#[derive(Clone)]
pub struct AppServices {
    pub auth: Arc<AuthService>,
    pub sessions: SeaOrmStore,
    pub customers: Arc<CustomerService>,
    pub visits: Arc<StoreVisitService>,
    pub deliveries: Arc<HomeDeliveryService>,
    pub contact_tracing: Arc<ContactTracingService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, config: &AppConfig) -> Self {
        Self {
            auth: Arc::new(AuthService::new(
                db_pool.clone(),
                PasswordPolicy::with_min_length(config.password_min_length),
            )),
            sessions: SeaOrmStore::new(db_pool.clone()),
            customers: Arc::new(CustomerService::new(
                db_pool.clone(),
                config.customers_per_page,
            )),
            visits: Arc::new(StoreVisitService::new(db_pool.clone())),
            deliveries: Arc::new(HomeDeliveryService::new(db_pool.clone())),
            contact_tracing: Arc::new(ContactTracingService::new(
                db_pool,
                config.contact_tracing_window_minutes,
                config.contact_tracing_lookback_days,
            )),
        }
    }
}
