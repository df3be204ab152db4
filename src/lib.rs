//! Shopkeeper library
//!
//! Customer management for small shops: accounts, customers, store visits,
//! home-delivery orders and contact tracing, served by axum over sea-orm.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod dto;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod services;
pub mod sessions;
pub mod tracing;

use axum::{
    extract::FromRef,
    middleware,
    routing::get,
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;

use crate::auth::user::UserSummary;
use crate::auth::AuthService;
use crate::handlers::AppServices;
use crate::sessions::FlashMessage;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: AppServices,
}

impl AppState {
    pub fn new(db: Arc<DatabaseConnection>, config: config::AppConfig) -> Self {
        let services = AppServices::new(db.clone(), &config);
        Self {
            db,
            config,
            services,
        }
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.services.auth.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// A rendered page: the template to show and everything it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse {
    pub template: String,
    pub user: Option<UserSummary>,
    /// Flash messages, shown once
    pub messages: Vec<FlashMessage>,
    pub context: Value,
    pub meta: ResponseMeta,
}

impl PageResponse {
    pub fn new(
        template: impl Into<String>,
        user: Option<UserSummary>,
        messages: Vec<FlashMessage>,
        context: Value,
    ) -> Self {
        Self {
            template: template.into(),
            user,
            messages,
            context,
            meta: ResponseMeta::capture(),
        }
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn page_response_includes_request_metadata() {
        let page =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                PageResponse::new("main/welcome.html", None, Vec::new(), Value::Null)
            })
            .await;

        assert_eq!(page.meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&page.meta.timestamp).expect("timestamp should parse");
    }
}

/// Page routes, keyed by the paths in [`handlers::common::Route`]
pub fn page_routes() -> Router<AppState> {
    use handlers::common::Route;
    use handlers::{auth, contact_tracing, customers, deliveries, visits};

    Router::new()
        .route(Route::WelcomePage.path(), get(auth::welcomepage))
        .route(
            Route::Register.path(),
            get(auth::register_form).post(auth::register),
        )
        .route(Route::Login.path(), get(auth::login_form).post(auth::login))
        .route(Route::Logout.path(), get(auth::logout).post(auth::logout))
        .route(
            Route::Home.path(),
            get(customers::home).post(customers::home_action),
        )
        .route(
            Route::AddCustomer.path(),
            get(customers::add_customer_form).post(customers::add_customer),
        )
        .route(
            Route::EditCustomer.path(),
            get(customers::edit_customer_form).post(customers::edit_customer),
        )
        .route(
            Route::StoreVisit.path(),
            get(visits::store_visit_page).post(visits::record_store_visit),
        )
        .route(
            Route::HomeDelivery.path(),
            get(deliveries::home_delivery_page).post(deliveries::place_home_delivery),
        )
        .route(
            Route::ContactTracing.path(),
            get(contact_tracing::contact_tracing_page),
        )
}

/// The full application with its middleware stack
pub fn app_router(state: AppState) -> Router {
    let session_layer = sessions::session_layer(state.services.sessions.clone(), &state.config);

    page_routes()
        .route("/health", get(handlers::health::health_check))
        .with_state(state)
        .layer(session_layer)
        .layer(middleware::from_fn(
            middleware_helpers::security_headers_middleware,
        ))
        .layer(CompressionLayer::new())
        .layer(crate::tracing::configure_http_tracing())
        .layer(middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
}
