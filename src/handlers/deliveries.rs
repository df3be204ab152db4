use super::common::{flash_and_redirect, redirect, render, Route};
use super::customers::owned_customer;
use crate::auth::{user, CurrentUser};
use crate::dto::customers::{CustomerQuery, HomeDeliveryForm};
use crate::dto::FormErrors;
use crate::errors::ServiceError;
use crate::models::customer;
use crate::sessions::{Session, SessionExt};
use crate::AppState;
use axum::{
    extract::{Form, Query, State},
    response::Response,
};
use serde_json::json;

async fn render_deliveries(
    state: &AppState,
    session: &Session,
    user: &user::Model,
    customer: &customer::Model,
    form: &HomeDeliveryForm,
    errors: FormErrors,
) -> Result<Response, ServiceError> {
    let orders = state
        .services
        .deliveries
        .list_for_customer(customer.cust_id)
        .await?;

    render(
        session,
        "main/homedelivery.html",
        Some(user),
        json!({
            "customer": customer,
            "orders": orders,
            "form": form,
            "errors": errors,
        }),
    )
    .await
}

pub async fn home_delivery_page(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Query(query): Query<CustomerQuery>,
) -> Result<Response, ServiceError> {
    let customer = match owned_customer(&state, &user, query.cust.as_deref()).await {
        Ok(customer) => customer,
        Err(e) => return flash_and_redirect(&session, e, Route::Home).await,
    };

    // prefill with the customer's address
    let form = HomeDeliveryForm {
        delivery_address: customer.address.clone(),
        ..Default::default()
    };
    render_deliveries(&state, &session, &user, &customer, &form, FormErrors::new()).await
}

pub async fn place_home_delivery(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Query(query): Query<CustomerQuery>,
    Form(form): Form<HomeDeliveryForm>,
) -> Result<Response, ServiceError> {
    let customer = match owned_customer(&state, &user, query.cust.as_deref()).await {
        Ok(customer) => customer,
        Err(e) => return flash_and_redirect(&session, e, Route::Home).await,
    };

    let mut errors = form.check();
    if errors.is_empty() {
        match state.services.deliveries.place(&customer, &form).await {
            Ok(_) => {
                session
                    .success(format!(
                        "Home delivery order placed for {}.",
                        customer.cust_name
                    ))
                    .await?;
                return Ok(redirect(Route::Home));
            }
            Err(ServiceError::ValidationError(msg)) => errors.add("delivery_address", msg),
            Err(e) => return Err(e),
        }
    }

    render_deliveries(&state, &session, &user, &customer, &form, errors).await
}
