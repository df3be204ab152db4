use super::common::{flash_and_redirect, redirect, render, Route};
use crate::auth::user;
use crate::auth::CurrentUser;
use crate::dto::customers::{CustomerForm, CustomerQuery, HomeActionForm, HomeQuery};
use crate::dto::FormErrors;
use crate::errors::ServiceError;
use crate::models::customer;
use crate::services::customers::parse_customer_id;
use crate::sessions::{Session, SessionExt};
use crate::AppState;
use axum::{
    extract::{Form, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;

const CHOOSE_ACTION: &str = "Please choose an action for the selected customer.";

/// Looks up `cust` among the user's own customers.
pub(crate) async fn owned_customer(
    state: &AppState,
    owner: &user::Model,
    raw: Option<&str>,
) -> Result<customer::Model, ServiceError> {
    let cust_id = parse_customer_id(raw)?;
    state.services.customers.get_owned(owner.id, cust_id).await
}

/// The home page: the user's customers, searched and paginated.
pub async fn home(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Query(query): Query<HomeQuery>,
) -> Result<Response, ServiceError> {
    let page = state
        .services
        .customers
        .list_page(user.id, query.search.as_deref(), query.page.as_deref())
        .await?;
    let employee = state.services.auth.employee_profile(user.id).await?;

    render(
        &session,
        "main/home.html",
        Some(&user),
        json!({
            "customers": page,
            "employee": employee,
            "search": query.search,
            "actions": ["storevisit", "homedelivery", "editcustomer", "contacttracing"],
        }),
    )
    .await
}

/// Sends the selected customer to the chosen detail page.
pub async fn home_action(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Form(form): Form<HomeActionForm>,
) -> Result<Response, ServiceError> {
    let Some(route) = form.func.as_deref().and_then(Route::from_func) else {
        session.error(CHOOSE_ACTION).await?;
        return Ok(redirect(Route::Home));
    };

    match owned_customer(&state, &user, form.cust.as_deref()).await {
        Ok(customer) => Ok(Redirect::to(&route.with_customer(customer.cust_id)).into_response()),
        Err(e) => flash_and_redirect(&session, e, Route::Home).await,
    }
}

async fn render_customer_form(
    session: &Session,
    template: &str,
    user: &user::Model,
    customer: Option<&customer::Model>,
    form: &CustomerForm,
    errors: FormErrors,
) -> Result<Response, ServiceError> {
    render(
        session,
        template,
        Some(user),
        json!({ "customer": customer, "form": form, "errors": errors }),
    )
    .await
}

pub async fn add_customer_form(
    CurrentUser(user): CurrentUser,
    session: Session,
) -> Result<Response, ServiceError> {
    render_customer_form(
        &session,
        "main/addcustomer.html",
        &user,
        None,
        &CustomerForm::default(),
        FormErrors::new(),
    )
    .await
}

pub async fn add_customer(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Form(form): Form<CustomerForm>,
) -> Result<Response, ServiceError> {
    let form = form.normalized();
    let mut errors = form.check();

    if errors.is_empty() {
        match state.services.customers.create(user.id, form.clone()).await {
            Ok(created) => {
                session
                    .success(format!("Customer {} added.", created.cust_name))
                    .await?;
                return Ok(redirect(Route::Home));
            }
            Err(ServiceError::ValidationError(msg)) => errors.add("phone", msg),
            Err(e) => return Err(e),
        }
    }

    render_customer_form(&session, "main/addcustomer.html", &user, None, &form, errors).await
}

pub async fn edit_customer_form(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Query(query): Query<CustomerQuery>,
) -> Result<Response, ServiceError> {
    let customer = match owned_customer(&state, &user, query.cust.as_deref()).await {
        Ok(customer) => customer,
        Err(e) => return flash_and_redirect(&session, e, Route::Home).await,
    };

    let form = CustomerForm {
        cust_name: customer.cust_name.clone(),
        phone: customer.phone.clone(),
        email: customer.email.clone(),
        address: customer.address.clone(),
    };

    render_customer_form(
        &session,
        "main/editcustomer.html",
        &user,
        Some(&customer),
        &form,
        FormErrors::new(),
    )
    .await
}

pub async fn edit_customer(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Query(query): Query<CustomerQuery>,
    Form(form): Form<CustomerForm>,
) -> Result<Response, ServiceError> {
    let customer = match owned_customer(&state, &user, query.cust.as_deref()).await {
        Ok(customer) => customer,
        Err(e) => return flash_and_redirect(&session, e, Route::Home).await,
    };

    let form = form.normalized();
    let mut errors = form.check();

    if errors.is_empty() {
        match state
            .services
            .customers
            .update(user.id, customer.cust_id, form.clone())
            .await
        {
            Ok(updated) => {
                session
                    .success(format!("Customer {} updated.", updated.cust_name))
                    .await?;
                return Ok(redirect(Route::Home));
            }
            Err(ServiceError::ValidationError(msg)) => errors.add("phone", msg),
            Err(e) => return flash_and_redirect(&session, e, Route::Home).await,
        }
    }

    render_customer_form(
        &session,
        "main/editcustomer.html",
        &user,
        Some(&customer),
        &form,
        errors,
    )
    .await
}
