/*!
 * # Authentication Module
 *
 * Account registration, credential checks and the extractors that resolve the
 * signed-in user from the request's session.
 *
 * Passwords are stored as argon2 PHC strings. A session only carries the user
 * id; the user row is re-read on every request so that deactivated accounts
 * lose access immediately.
 */

pub mod password_policy;
pub mod user;

pub use password_policy::{PasswordPolicy, PasswordPolicyError};

use crate::db::DatabaseAccess;
use crate::dto::auth::RegisterForm;
use crate::dto::FormErrors;
use crate::errors::ServiceError;
use crate::handlers::common::Route;
use crate::models::employee;
use crate::sessions::{Session, SessionExt};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use lazy_static::lazy_static;
use metrics::counter;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
    SqlErr,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub const LOGIN_REQUIRED_MESSAGE: &str = "Please log in to continue.";

lazy_static! {
    // Verified against when the username is unknown, so both paths cost one hash check
    static ref DUMMY_HASH: Option<String> = hash_password("shopkeeper-timing-equalizer").ok();
}

/// Hashes a password into an argon2 PHC string with a random salt
pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServiceError::HashError(e.to_string()))
}

/// Checks a password against a stored PHC string
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, ServiceError> {
    let parsed =
        PasswordHash::new(stored_hash).map_err(|e| ServiceError::HashError(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("registration form is invalid")]
    Invalid(FormErrors),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<DbErr> for RegistrationError {
    fn from(err: DbErr) -> Self {
        RegistrationError::Service(ServiceError::DatabaseError(err))
    }
}

/// Account registration and credential checks
#[derive(Debug, Clone)]
pub struct AuthService {
    db: Arc<DatabaseConnection>,
    policy: PasswordPolicy,
}

impl AuthService {
    pub fn new(db: Arc<DatabaseConnection>, policy: PasswordPolicy) -> Self {
        Self { db, policy }
    }

    async fn username_taken(&self, username: &str) -> Result<bool, ServiceError> {
        let existing = user::Entity::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(user::Column::Username)))
                    .eq(username.to_lowercase()),
            )
            .one(&*self.db)
            .await?;
        Ok(existing.is_some())
    }

    /// Creates the account and its employee profile in one transaction.
    #[instrument(skip(self, form), fields(username = %form.username))]
    pub async fn register(&self, form: &RegisterForm) -> Result<user::Model, RegistrationError> {
        let mut errors = form.check();

        if errors.get("username").is_none() && self.username_taken(&form.username).await? {
            errors.add("username", "A user with that username already exists.");
        }

        if errors.get("password2").is_none() && errors.get("password1").is_none() {
            let attributes = [
                ("username", form.username.as_str()),
                ("email address", form.email.as_deref().unwrap_or_default()),
                ("full name", form.full_name.as_deref().unwrap_or_default()),
            ];
            if let Err(failures) = self.policy.validate(&form.password1, &attributes) {
                for failure in failures {
                    errors.add("password2", failure.to_string());
                }
            }
        }

        if !errors.is_empty() {
            debug!("Registration rejected");
            return Err(RegistrationError::Invalid(errors));
        }

        let password_hash = hash_password(&form.password1)?;
        let now = Utc::now();
        let new_user = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(form.username.clone()),
            email: Set(form.email.clone().unwrap_or_default()),
            password_hash: Set(password_hash),
            active: Set(true),
            last_login: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let full_name = form.full_name.clone().unwrap_or_default();
        let store_name = form.store_name.clone().unwrap_or_default();

        let result = DatabaseAccess::new(self.db.clone())
            .transaction(|txn| {
                Box::pin(async move {
                    let user = new_user.insert(txn).await?;
                    employee::ActiveModel {
                        user_id: Set(user.id),
                        full_name: Set(full_name),
                        store_name: Set(store_name),
                        created_at: Set(now),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;
                    Ok::<_, ServiceError>(user)
                })
            })
            .await;

        match result {
            Ok(user) => {
                counter!("shopkeeper.auth.registrations", 1);
                info!(user_id = %user.id, "Registered new user");
                Ok(user)
            }
            Err(ServiceError::DatabaseError(e))
                if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
            {
                let mut errors = FormErrors::new();
                errors.add("username", "A user with that username already exists.");
                Err(RegistrationError::Invalid(errors))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the user only if it exists, is active and the password matches.
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<user::Model>, ServiceError> {
        let found = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(&*self.db)
            .await?;

        let Some(found) = found else {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                let _ = verify_password(password, dummy);
            }
            counter!("shopkeeper.auth.login_failures", 1);
            return Ok(None);
        };

        if !verify_password(password, &found.password_hash)? || !found.active {
            warn!(user_id = %found.id, "Rejected login attempt");
            counter!("shopkeeper.auth.login_failures", 1);
            return Ok(None);
        }

        let mut active: user::ActiveModel = found.into();
        let now = Utc::now();
        active.last_login = Set(Some(now));
        active.updated_at = Set(now);
        let user = active.update(&*self.db).await?;

        counter!("shopkeeper.auth.logins", 1);
        Ok(Some(user))
    }

    /// Loads an active user by id
    pub async fn find_active(&self, user_id: Uuid) -> Result<Option<user::Model>, ServiceError> {
        let found = user::Entity::find_by_id(user_id).one(&*self.db).await?;
        Ok(found.filter(|u| u.active))
    }

    pub async fn employee_profile(
        &self,
        user_id: Uuid,
    ) -> Result<Option<employee::Model>, ServiceError> {
        Ok(employee::Entity::find()
            .filter(employee::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?)
    }
}

fn session_from_parts(parts: &Parts) -> Result<Session, ServiceError> {
    parts
        .extensions
        .get::<Session>()
        .cloned()
        .ok_or_else(|| ServiceError::SessionError("Session layer is not installed".into()))
}

async fn resolve_user<S>(parts: &Parts, state: &S) -> Result<Option<user::Model>, ServiceError>
where
    Arc<AuthService>: FromRef<S>,
{
    let session = session_from_parts(parts)?;
    let Some(user_id) = session.user_id().await? else {
        return Ok(None);
    };
    let auth = Arc::<AuthService>::from_ref(state);
    auth.find_active(user_id).await
}

/// The signed-in user. Requests without one are redirected to the login page.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub user::Model);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match resolve_user(parts, state).await {
            Ok(Some(user)) => Ok(CurrentUser(user)),
            Ok(None) => {
                let session = session_from_parts(parts).map_err(IntoResponse::into_response)?;
                session
                    .error(LOGIN_REQUIRED_MESSAGE)
                    .await
                    .map_err(IntoResponse::into_response)?;
                Err(Redirect::to(Route::Login.path()).into_response())
            }
            Err(e) => Err(e.into_response()),
        }
    }
}

/// The signed-in user, if any
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<user::Model>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        resolve_user(parts, state).await.map(MaybeUser)
    }
}
