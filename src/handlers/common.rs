use crate::auth::user::{self, UserSummary};
use crate::errors::ServiceError;
use crate::sessions::{Session, SessionExt};
use crate::PageResponse;
use axum::{
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde_json::Value;
use strum::{EnumIter, IntoEnumIterator};

/// Named page routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum Route {
    WelcomePage,
    Register,
    Login,
    Logout,
    Home,
    AddCustomer,
    StoreVisit,
    HomeDelivery,
    EditCustomer,
    ContactTracing,
}

impl Route {
    pub fn name(self) -> &'static str {
        match self {
            Route::WelcomePage => "main:welcomepage",
            Route::Register => "main:register",
            Route::Login => "main:login",
            Route::Logout => "main:logout",
            Route::Home => "main:home",
            Route::AddCustomer => "main:addcustomer",
            Route::StoreVisit => "main:storevisit",
            Route::HomeDelivery => "main:homedelivery",
            Route::EditCustomer => "main:editcustomer",
            Route::ContactTracing => "main:contacttracing",
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Route::WelcomePage => "/",
            Route::Register => "/register",
            Route::Login => "/login",
            Route::Logout => "/logout",
            Route::Home => "/home",
            Route::AddCustomer => "/addcustomer",
            Route::StoreVisit => "/storevisit",
            Route::HomeDelivery => "/homedelivery",
            Route::EditCustomer => "/editcustomer",
            Route::ContactTracing => "/contacttracing",
        }
    }

    pub fn from_name(name: &str) -> Option<Route> {
        Route::iter().find(|route| route.name() == name)
    }

    /// Detail pages reachable from the home page's action picker
    pub fn from_func(func: &str) -> Option<Route> {
        match func.trim() {
            "storevisit" => Some(Route::StoreVisit),
            "homedelivery" => Some(Route::HomeDelivery),
            "editcustomer" => Some(Route::EditCustomer),
            "contacttracing" => Some(Route::ContactTracing),
            _ => None,
        }
    }

    pub fn with_customer(self, cust_id: i32) -> String {
        format!("{}?cust={}", self.path(), cust_id)
    }
}

/// 303 redirect to a named route
pub fn redirect(route: Route) -> Response {
    Redirect::to(route.path()).into_response()
}

/// Reports a user-facing error as a flash message and redirects; anything
/// else is returned as a failure.
pub async fn flash_and_redirect(
    session: &Session,
    err: ServiceError,
    route: Route,
) -> Result<Response, ServiceError> {
    if err.is_user_facing() {
        session.error(err.user_message()).await?;
        Ok(redirect(route))
    } else {
        Err(err)
    }
}

/// Renders `template`, draining the session's flash messages into the page.
pub async fn render(
    session: &Session,
    template: &str,
    user: Option<&user::Model>,
    context: Value,
) -> Result<Response, ServiceError> {
    let messages = session.take_messages().await?;
    Ok(Json(PageResponse::new(
        template,
        user.map(UserSummary::from),
        messages,
        context,
    ))
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, StatusCode};

    #[test]
    fn names_and_paths_are_unique() {
        let routes: Vec<Route> = Route::iter().collect();
        for (i, a) in routes.iter().enumerate() {
            for b in &routes[i + 1..] {
                assert_ne!(a.name(), b.name());
                assert_ne!(a.path(), b.path());
            }
            assert_eq!(Route::from_name(a.name()), Some(*a));
        }
    }

    #[test]
    fn func_dispatch_covers_detail_pages_only() {
        assert_eq!(Route::from_func("storevisit"), Some(Route::StoreVisit));
        assert_eq!(Route::from_func("contacttracing"), Some(Route::ContactTracing));
        assert_eq!(Route::from_func("logout"), None);
        assert_eq!(
            Route::HomeDelivery.with_customer(7),
            "/homedelivery?cust=7"
        );
    }

    #[test]
    fn redirect_is_see_other() {
        let response = redirect(Route::Home);
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/home");
    }

    #[tokio::test]
    async fn internal_errors_are_not_flashed() {
        let session = crate::sessions::tests::memory_session();
        let result =
            flash_and_redirect(&session, ServiceError::InternalError("x".into()), Route::Home)
                .await;
        assert!(result.is_err());
        assert!(session.take_messages().await.unwrap().is_empty());

        let result = flash_and_redirect(
            &session,
            ServiceError::NotFound("Customer not found.".into()),
            Route::Home,
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(
            session.take_messages().await.unwrap()[0].text,
            "Customer not found."
        );
    }
}
