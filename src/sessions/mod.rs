//! Server-side sessions on `tower-sessions`, stored in the `sessions` table,
//! plus one-shot flash messages kept under a session key.

pub mod store;

pub use store::SeaOrmStore;
pub use tower_sessions::Session;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tower_sessions::cookie::SameSite;
use tower_sessions::{Expiry, SessionManagerLayer};
use uuid::Uuid;

pub(crate) const USER_ID_KEY: &str = "user_id";
const FLASH_KEY: &str = "flash";

/// Severity of a flash message
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FlashLevel {
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub text: String,
}

/// Session layer with the cookie settings from `config`. Idle sessions expire
/// after `session_ttl_secs`.
pub fn session_layer(
    store: SeaOrmStore,
    config: &AppConfig,
) -> SessionManagerLayer<SeaOrmStore> {
    SessionManagerLayer::new(store)
        .with_name(config.session_cookie_name.clone())
        .with_path("/")
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_secure(config.session_cookie_secure)
        .with_expiry(Expiry::OnInactivity(time::Duration::seconds(
            config.session_ttl_secs as i64,
        )))
}

/// User binding and flash messages on top of a [`Session`]
#[async_trait]
pub trait SessionExt {
    async fn user_id(&self) -> Result<Option<Uuid>, ServiceError>;

    /// Binds the session to `user_id` under a new session id.
    async fn login(&self, user_id: Uuid) -> Result<(), ServiceError>;

    /// Forgets the user and any pending messages, and issues a new session id.
    async fn logout(&self) -> Result<(), ServiceError>;

    async fn flash<T>(&self, level: FlashLevel, text: T) -> Result<(), ServiceError>
    where
        T: Into<String> + Send;

    async fn success<T>(&self, text: T) -> Result<(), ServiceError>
    where
        T: Into<String> + Send;

    async fn info<T>(&self, text: T) -> Result<(), ServiceError>
    where
        T: Into<String> + Send;

    async fn error<T>(&self, text: T) -> Result<(), ServiceError>
    where
        T: Into<String> + Send;

    /// Drains pending messages; each is returned exactly once.
    async fn take_messages(&self) -> Result<Vec<FlashMessage>, ServiceError>;
}

#[async_trait]
impl SessionExt for Session {
    async fn user_id(&self) -> Result<Option<Uuid>, ServiceError> {
        Ok(self.get::<Uuid>(USER_ID_KEY).await?)
    }

    async fn login(&self, user_id: Uuid) -> Result<(), ServiceError> {
        self.cycle_id().await?;
        self.insert(USER_ID_KEY, user_id).await?;
        Ok(())
    }

    async fn logout(&self) -> Result<(), ServiceError> {
        self.clear().await;
        self.cycle_id().await?;
        Ok(())
    }

    async fn flash<T>(&self, level: FlashLevel, text: T) -> Result<(), ServiceError>
    where
        T: Into<String> + Send,
    {
        let mut pending: Vec<FlashMessage> = self.get(FLASH_KEY).await?.unwrap_or_default();
        pending.push(FlashMessage {
            level,
            text: text.into(),
        });
        self.insert(FLASH_KEY, pending).await?;
        Ok(())
    }

    async fn success<T>(&self, text: T) -> Result<(), ServiceError>
    where
        T: Into<String> + Send,
    {
        self.flash(FlashLevel::Success, text).await
    }

    async fn info<T>(&self, text: T) -> Result<(), ServiceError>
    where
        T: Into<String> + Send,
    {
        self.flash(FlashLevel::Info, text).await
    }

    async fn error<T>(&self, text: T) -> Result<(), ServiceError>
    where
        T: Into<String> + Send,
    {
        self.flash(FlashLevel::Error, text).await
    }

    async fn take_messages(&self) -> Result<Vec<FlashMessage>, ServiceError> {
        Ok(self
            .remove::<Vec<FlashMessage>>(FLASH_KEY)
            .await?
            .unwrap_or_default())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::Arc;
    use tower_sessions::MemoryStore;

    pub(crate) fn memory_session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    #[tokio::test]
    async fn messages_are_taken_once() {
        let session = memory_session();
        session.success("saved").await.unwrap();
        session.error("but also this").await.unwrap();

        let messages = session.take_messages().await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].level, FlashLevel::Success);
        assert!(session.take_messages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn logout_forgets_user_and_messages() {
        let session = memory_session();
        let user = Uuid::new_v4();
        session.login(user).await.unwrap();
        assert_eq!(session.user_id().await.unwrap(), Some(user));

        session.info("pending").await.unwrap();
        session.logout().await.unwrap();
        assert_eq!(session.user_id().await.unwrap(), None);
        assert!(session.take_messages().await.unwrap().is_empty());
    }

    #[test]
    fn flash_level_round_trips_through_strings() {
        assert_eq!(FlashLevel::Warning.to_string(), "warning");
        assert_eq!(FlashLevel::from_str("error").unwrap(), FlashLevel::Error);
    }
}
