mod common;

use axum::http::StatusCode;
use common::{json_body, location, messages, TestApp, PASSWORD};
use sea_orm::EntityTrait;
use shopkeeper::models::session;

#[tokio::test]
async fn welcome_page_is_public() {
    let app = TestApp::new().await;

    let page = app.page("/").await;
    assert_eq!(page["template"], "main/welcome.html");
    assert!(page["user"].is_null());
    assert!(messages(&page).is_empty());
}

#[tokio::test]
async fn register_signs_in_and_greets_once() {
    let app = TestApp::new().await;

    let response = app.register("alice").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/home");
    assert!(app.cookie().is_some());

    let home = app.page("/home").await;
    assert_eq!(home["template"], "main/home.html");
    assert_eq!(home["user"]["username"], "alice");
    assert!(home["user"].get("password_hash").is_none());
    assert_eq!(messages(&home), vec!["New account created: alice"]);
    assert_eq!(home["context"]["employee"]["store_name"], "Corner Store");

    // flash messages are shown once
    let again = app.page("/home").await;
    assert!(messages(&again).is_empty());
}

#[tokio::test]
async fn weak_password_shows_policy_messages() {
    let app = TestApp::new().await;

    let response = app
        .post(
            "/register",
            &[
                ("username", "bob"),
                ("password1", "12345678"),
                ("password2", "12345678"),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let page = json_body(response).await;
    assert_eq!(page["template"], "main/register.html");
    assert_eq!(
        messages(&page),
        vec![
            "Your password can't be too similar to your other personal information or a commonly used password.",
            "Your password must contain atleast 8 characters and can't be entirely numeric.",
        ]
    );
    assert!(page["context"]["errors"]["password2"]
        .as_array()
        .is_some_and(|errors| errors.contains(&"This password is entirely numeric.".into())));
    assert_eq!(page["context"]["form"]["username"], "bob");
    assert!(page["context"]["form"].get("password1").is_none());
}

#[tokio::test]
async fn any_invalid_registration_shows_both_password_hints() {
    let app = TestApp::new().await;
    app.register_and_login("carol").await;

    let other = app.new_browser();
    let response = other
        .post(
            "/register",
            &[
                ("username", "CAROL"),
                ("password1", PASSWORD),
                ("password2", "something-else-99"),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let page = json_body(response).await;
    assert_eq!(
        messages(&page),
        vec![
            "Your password can't be too similar to your other personal information or a commonly used password.",
            "Your password must contain atleast 8 characters and can't be entirely numeric.",
        ]
    );
    let errors = &page["context"]["errors"];
    assert_eq!(errors["username"][0], "A user with that username already exists.");
    assert_eq!(errors["password2"][0], "The two password fields didn't match.");
    assert!(page["user"].is_null());
}

#[tokio::test]
async fn short_username_inside_password_is_accepted() {
    let app = TestApp::new().await;

    // the password contains "bo" ("harbour")
    let response = app.register("bo").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/home");
}

#[tokio::test]
async fn login_with_wrong_password_is_rejected() {
    let app = TestApp::new().await;
    app.register_and_login("dave").await;
    app.get("/logout").await;

    let response = app
        .post("/login", &[("username", "dave"), ("password", "not-the-password")])
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let page = json_body(response).await;
    assert_eq!(page["template"], "main/login.html");
    assert_eq!(messages(&page), vec!["Invalid username or password."]);
    assert_eq!(page["context"]["form"]["username"], "dave");

    let response = app
        .post("/login", &[("username", "nobody"), ("password", PASSWORD)])
        .await;
    let page = json_body(response).await;
    assert_eq!(messages(&page), vec!["Invalid username or password."]);
}

#[tokio::test]
async fn login_and_logout_round_trip() {
    let app = TestApp::new().await;
    app.register_and_login("erin").await;

    let response = app.post("/logout", &[]).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let welcome = app.page("/").await;
    assert!(welcome["user"].is_null());
    assert_eq!(messages(&welcome), vec!["Logged out successfully!"]);

    let response = app
        .post("/login", &[("username", "erin"), ("password", PASSWORD)])
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/home");

    let home = app.page("/home").await;
    assert_eq!(messages(&home), vec!["You are now logged in as erin"]);
}

#[tokio::test]
async fn login_rotates_the_session_token() {
    let app = TestApp::new().await;
    app.register_and_login("frank").await;
    app.get("/logout").await;

    app.page("/login").await;
    let before = app.cookie();
    app.post("/login", &[("username", "frank"), ("password", PASSWORD)])
        .await;
    let after = app.cookie();

    assert!(after.is_some());
    assert_ne!(before, after);
}

#[tokio::test]
async fn session_rows_are_keyed_by_a_digest_of_the_cookie() {
    let app = TestApp::new().await;
    app.register_and_login("gina").await;
    let cookie = app.cookie().expect("session cookie");

    let rows = session::Entity::find()
        .all(&*app.state.db)
        .await
        .expect("list sessions");
    assert_eq!(rows.len(), 1);
    assert_ne!(rows[0].id, cookie);
    assert_eq!(rows[0].id.len(), 64);
    assert!(rows[0].user_id.is_some());

    app.post("/logout", &[]).await;
    let rows = session::Entity::find()
        .all(&*app.state.db)
        .await
        .expect("list sessions");
    assert!(rows.iter().all(|row| row.user_id.is_none()));
}

#[tokio::test]
async fn protected_pages_redirect_to_login() {
    let app = TestApp::new().await;

    for uri in ["/home", "/addcustomer", "/storevisit?cust=1", "/contacttracing?cust=1"] {
        let response = app.get(uri).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(location(&response), "/login", "{uri}");
    }

    let login = app.page("/login").await;
    assert!(messages(&login).contains(&"Please log in to continue.".to_string()));
}

#[tokio::test]
async fn responses_carry_security_and_request_id_headers() {
    let app = TestApp::new().await;

    let response = app.get("/").await;
    let headers = response.headers();
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn health_reports_database_status() {
    let app = TestApp::new().await;

    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "up");
}
