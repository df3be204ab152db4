use super::common::{flash_and_redirect, redirect, render, Route};
use super::customers::owned_customer;
use crate::auth::{user, CurrentUser};
use crate::dto::customers::{CustomerQuery, StoreVisitForm};
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

async fn render_visits(
    state: &AppState,
    session: &Session,
    user: &user::Model,
    customer: &customer::Model,
    form: &StoreVisitForm,
    errors: FormErrors,
) -> Result<Response, ServiceError> {
    let visits = state
        .services
        .visits
        .list_for_customer(customer.cust_id)
        .await?;

    render(
        session,
        "main/storevisit.html",
        Some(user),
        json!({
            "customer": customer,
            "visits": visits,
            "form": form,
            "errors": errors,
        }),
    )
    .await
}

pub async fn store_visit_page(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Query(query): Query<CustomerQuery>,
) -> Result<Response, ServiceError> {
    match owned_customer(&state, &user, query.cust.as_deref()).await {
        Ok(customer) => {
            render_visits(
                &state,
                &session,
                &user,
                &customer,
                &StoreVisitForm::default(),
                FormErrors::new(),
            )
            .await
        }
        Err(e) => flash_and_redirect(&session, e, Route::Home).await,
    }
}

pub async fn record_store_visit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Query(query): Query<CustomerQuery>,
    Form(form): Form<StoreVisitForm>,
) -> Result<Response, ServiceError> {
    let customer = match owned_customer(&state, &user, query.cust.as_deref()).await {
        Ok(customer) => customer,
        Err(e) => return flash_and_redirect(&session, e, Route::Home).await,
    };

    let mut errors = form.check();
    if errors.is_empty() {
        match state.services.visits.record(&customer, &form).await {
            Ok(_) => {
                session
                    .success(format!("Store visit recorded for {}.", customer.cust_name))
                    .await?;
                return Ok(redirect(Route::Home));
            }
            Err(ServiceError::ValidationError(msg)) => errors.add("visited_at", msg),
            Err(e) => return Err(e),
        }
    }

    render_visits(&state, &session, &user, &customer, &form, errors).await
}
