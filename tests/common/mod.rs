#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::{
    body::{self, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::Value;
use shopkeeper::{app_router, config::AppConfig, db, AppState};
use tower::ServiceExt;

pub const PASSWORD: &str = "tangerine-harbour-42";

/// Helper harness for driving the full router against an in-memory SQLite database.
///
/// Holds a single-cookie jar so consecutive requests share a browser session.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    cookie: Arc<Mutex<Option<String>>>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(Arc::new(pool), cfg);
        let router = app_router(state.clone());

        Self {
            router,
            state,
            cookie: Arc::new(Mutex::new(None)),
        }
    }

    /// A second browser against the same application and database
    pub fn new_browser(&self) -> Self {
        Self {
            router: self.router.clone(),
            state: self.state.clone(),
            cookie: Arc::new(Mutex::new(None)),
        }
    }

    pub fn cookie(&self) -> Option<String> {
        self.cookie.lock().expect("cookie jar poisoned").clone()
    }

    fn cookie_name(&self) -> String {
        self.state.config.session_cookie_name.clone()
    }

    fn store_cookie(&self, response: &Response) {
        let name = self.cookie_name();
        for value in response.headers().get_all(header::SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            let pair = raw.split(';').next().unwrap_or_default();
            let Some((key, token)) = pair.split_once('=') else {
                continue;
            };
            if key.trim() != name {
                continue;
            }
            let expired = raw.contains("Max-Age=0") || token.is_empty();
            let mut jar = self.cookie.lock().expect("cookie jar poisoned");
            *jar = if expired {
                None
            } else {
                Some(token.to_string())
            };
        }
    }

    pub async fn send(&self, method: Method, uri: &str, form: Option<&[(&str, &str)]>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(token) = self.cookie() {
            builder = builder.header(header::COOKIE, format!("{}={}", self.cookie_name(), token));
        }

        let body = match form {
            Some(fields) => {
                builder = builder.header(
                    header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded",
                );
                Body::from(serde_urlencoded::to_string(fields).expect("encode form"))
            }
            None => Body::empty(),
        };

        let request = builder.body(body).expect("failed to build request");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request");
        self.store_cookie(&response);
        response
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, form: &[(&str, &str)]) -> Response {
        self.send(Method::POST, uri, Some(form)).await
    }

    /// GET a page and decode its JSON body, asserting a 200.
    pub async fn page(&self, uri: &str) -> Value {
        let response = self.get(uri).await;
        assert_eq!(response.status(), StatusCode::OK, "GET {uri}");
        json_body(response).await
    }

    pub async fn register(&self, username: &str) -> Response {
        self.post(
            "/register",
            &[
                ("username", username),
                ("email", ""),
                ("password1", PASSWORD),
                ("password2", PASSWORD),
                ("full_name", "Pat Keeper"),
                ("store_name", "Corner Store"),
            ],
        )
        .await
    }

    /// Registers `username` (which signs it in) and clears the welcome flash.
    pub async fn register_and_login(&self, username: &str) {
        let response = self.register(username).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/home");
        self.page("/home").await;
    }

    /// Adds a customer and returns its id as shown on the home page.
    pub async fn add_customer(&self, name: &str, phone: &str, address: Option<&str>) -> i64 {
        let response = self
            .post(
                "/addcustomer",
                &[
                    ("cust_name", name),
                    ("phone", phone),
                    ("email", ""),
                    ("address", address.unwrap_or_default()),
                ],
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "add {name}");

        let query = serde_urlencoded::to_string([("search", phone)]).expect("encode query");
        let page = self.page(&format!("/home?{query}")).await;
        page["context"]["customers"]["items"]
            .as_array()
            .and_then(|items| items.iter().find(|c| c["cust_name"] == name))
            .and_then(|c| c["cust_id"].as_i64())
            .expect("added customer listed on home page")
    }
}

pub async fn json_body(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Flash message texts on a rendered page
pub fn messages(page: &Value) -> Vec<String> {
    page["messages"]
        .as_array()
        .map(|messages| {
            messages
                .iter()
                .filter_map(|m| m["text"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
