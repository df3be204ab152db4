use super::common::{redirect, render, Route};
use crate::auth::{MaybeUser, RegistrationError};
use crate::dto::auth::{LoginForm, RegisterEcho, RegisterForm};
use crate::dto::FormErrors;
use crate::errors::ServiceError;
use crate::sessions::{Session, SessionExt};
use crate::AppState;
use axum::{
    extract::{Form, State},
    response::Response,
};
use serde_json::json;
use tracing::info;

const PASSWORD_SIMILARITY_HELP: &str = "Your password can't be too similar to your other personal information or a commonly used password.";
const PASSWORD_COMPOSITION_HELP: &str =
    "Your password must contain atleast 8 characters and can't be entirely numeric.";
const INVALID_CREDENTIALS: &str = "Invalid username or password.";

pub async fn welcomepage(
    MaybeUser(user): MaybeUser,
    session: Session,
) -> Result<Response, ServiceError> {
    render(&session, "main/welcome.html", user.as_ref(), json!({})).await
}

async fn render_register(
    session: &Session,
    user: Option<&crate::auth::user::Model>,
    form: RegisterEcho,
    errors: FormErrors,
) -> Result<Response, ServiceError> {
    render(
        session,
        "main/register.html",
        user,
        json!({ "form": form, "errors": errors }),
    )
    .await
}

pub async fn register_form(
    MaybeUser(user): MaybeUser,
    session: Session,
) -> Result<Response, ServiceError> {
    render_register(&session, user.as_ref(), RegisterEcho::default(), FormErrors::new()).await
}

/// Creates the account, signs it in and goes to the home page. Any invalid
/// form gets the two password hints; field errors go to `context.errors`.
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Result<Response, ServiceError> {
    match state.services.auth.register(&form).await {
        Ok(user) => {
            session.login(user.id).await?;
            session
                .success(format!("New account created: {}", user.username))
                .await?;
            Ok(redirect(Route::Home))
        }
        Err(RegistrationError::Invalid(errors)) => {
            session.error(PASSWORD_SIMILARITY_HELP).await?;
            session.error(PASSWORD_COMPOSITION_HELP).await?;
            render_register(&session, None, form.echo(), errors).await
        }
        Err(RegistrationError::Service(e)) => Err(e),
    }
}

async fn render_login(session: &Session, username: &str) -> Result<Response, ServiceError> {
    render(
        session,
        "main/login.html",
        None,
        json!({ "form": { "username": username } }),
    )
    .await
}

pub async fn login_form(
    MaybeUser(user): MaybeUser,
    session: Session,
) -> Result<Response, ServiceError> {
    render(
        &session,
        "main/login.html",
        user.as_ref(),
        json!({ "form": { "username": "" } }),
    )
    .await
}

pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response, ServiceError> {
    if form.is_complete() {
        if let Some(user) = state
            .services
            .auth
            .authenticate(form.username.trim(), &form.password)
            .await?
        {
            session.login(user.id).await?;
            session
                .info(format!("You are now logged in as {}", user.username))
                .await?;
            info!(user_id = %user.id, "User logged in");
            return Ok(redirect(Route::Home));
        }
    }

    session.error(INVALID_CREDENTIALS).await?;
    render_login(&session, form.username.trim()).await
}

pub async fn logout(session: Session) -> Result<Response, ServiceError> {
    session.logout().await?;
    session.info("Logged out successfully!").await?;
    Ok(redirect(Route::WelcomePage))
}
