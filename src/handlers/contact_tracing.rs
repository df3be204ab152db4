use super::common::{flash_and_redirect, render, Route};
use super::customers::owned_customer;
use crate::auth::CurrentUser;
use crate::dto::customers::CustomerQuery;
use crate::errors::ServiceError;
use crate::sessions::Session;
use crate::AppState;
use axum::{
    extract::{Query, State},
    response::Response,
};
use serde_json::json;

/// Other customers whose visits overlapped with the selected customer's.
pub async fn contact_tracing_page(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Query(query): Query<CustomerQuery>,
) -> Result<Response, ServiceError> {
    let customer = match owned_customer(&state, &user, query.cust.as_deref()).await {
        Ok(customer) => customer,
        Err(e) => return flash_and_redirect(&session, e, Route::Home).await,
    };

    let report = state
        .services
        .contact_tracing
        .trace(user.id, &customer)
        .await?;

    render(
        &session,
        "main/contacttracing.html",
        Some(&user),
        json!({ "report": report }),
    )
    .await
}
