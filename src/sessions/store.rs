use super::USER_ID_KEY;
use crate::errors::ServiceError;
use crate::models::session::{self, Entity as SessionEntity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tower_sessions::session::{Id, Record};
use tower_sessions::session_store::{self, ExpiredDeletion, SessionStore};
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// `tower-sessions` store over the `sessions` table. Rows are keyed by the
/// SHA-256 digest of the session id, so the cookie value is never stored.
#[derive(Debug, Clone)]
pub struct SeaOrmStore {
    db: Arc<DatabaseConnection>,
}

pub(crate) fn row_id(id: &Id) -> String {
    hex::encode(Sha256::digest(id.to_string().as_bytes()))
}

fn backend(err: DbErr) -> session_store::Error {
    error!("Session store query failed: {}", err);
    session_store::Error::Backend(err.to_string())
}

fn to_chrono(at: OffsetDateTime) -> session_store::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(at.unix_timestamp(), at.nanosecond())
        .ok_or_else(|| session_store::Error::Encode(format!("expiry out of range: {}", at)))
}

fn to_offset(at: DateTime<Utc>) -> session_store::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| session_store::Error::Decode(e.to_string()))
}

fn bound_user(record: &Record) -> Option<Uuid> {
    record
        .data
        .get(USER_ID_KEY)
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}

impl SeaOrmStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn row(record: &Record, now: DateTime<Utc>) -> session_store::Result<session::ActiveModel> {
        let data = serde_json::to_string(&record.data)
            .map_err(|e| session_store::Error::Encode(e.to_string()))?;
        Ok(session::ActiveModel {
            id: Set(row_id(&record.id)),
            user_id: Set(bound_user(record)),
            data: Set(data),
            expires_at: Set(to_chrono(record.expiry_date)?),
            created_at: Set(now),
            updated_at: Set(now),
        })
    }

    async fn exists(&self, id: &Id) -> session_store::Result<bool> {
        Ok(SessionEntity::find_by_id(row_id(id))
            .one(&*self.db)
            .await
            .map_err(backend)?
            .is_some())
    }

    /// Deletes every expired session, returning how many were removed.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self) -> Result<u64, ServiceError> {
        let result = SessionEntity::delete_many()
            .filter(session::Column::ExpiresAt.lte(Utc::now()))
            .exec(&*self.db)
            .await
            .map_err(|e| {
                error!("Failed to purge expired sessions: {}", e);
                ServiceError::DatabaseError(e)
            })?;

        if result.rows_affected > 0 {
            debug!(removed = result.rows_affected, "Purged expired sessions");
            counter!("shopkeeper.sessions.purged", result.rows_affected);
        }
        Ok(result.rows_affected)
    }
}

#[async_trait]
impl SessionStore for SeaOrmStore {
    #[instrument(skip_all)]
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        while self.exists(&record.id).await? {
            record.id = Id::default();
        }

        SessionEntity::insert(Self::row(record, Utc::now())?)
            .exec_without_returning(&*self.db)
            .await
            .map_err(backend)?;

        counter!("shopkeeper.sessions.created", 1);
        Ok(())
    }

    /// Upserts the record; `created_at` is kept on update.
    #[instrument(skip_all)]
    async fn save(&self, record: &Record) -> session_store::Result<()> {
        SessionEntity::insert(Self::row(record, Utc::now())?)
            .on_conflict(
                OnConflict::column(session::Column::Id)
                    .update_columns([
                        session::Column::UserId,
                        session::Column::Data,
                        session::Column::ExpiresAt,
                        session::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await
            .map_err(backend)?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        let Some(row) = SessionEntity::find_by_id(row_id(session_id))
            .filter(session::Column::ExpiresAt.gt(Utc::now()))
            .one(&*self.db)
            .await
            .map_err(backend)?
        else {
            return Ok(None);
        };

        let data: HashMap<String, Value> = serde_json::from_str(&row.data)
            .map_err(|e| session_store::Error::Decode(e.to_string()))?;

        Ok(Some(Record {
            id: *session_id,
            data,
            expiry_date: to_offset(row.expires_at)?,
        }))
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        SessionEntity::delete_by_id(row_id(session_id))
            .exec(&*self.db)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl ExpiredDeletion for SeaOrmStore {
    async fn delete_expired(&self) -> session_store::Result<()> {
        self.purge_expired()
            .await
            .map(|_| ())
            .map_err(|e| session_store::Error::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> SeaOrmStore {
        let pool = crate::db::establish_connection_with_config(&crate::db::DbConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            ..Default::default()
        })
        .await
        .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        SeaOrmStore::new(Arc::new(pool))
    }

    fn record(ttl: time::Duration) -> Record {
        Record {
            id: Id::default(),
            data: HashMap::from([("flash".to_string(), json!([{"level": "info", "text": "hi"}]))]),
            expiry_date: OffsetDateTime::now_utc() + ttl,
        }
    }

    #[test]
    fn row_id_is_a_digest_of_the_session_id() {
        let id = Id::default();
        let digest = row_id(&id);
        assert_eq!(digest.len(), 64);
        assert_ne!(digest, id.to_string());
        assert_eq!(digest, row_id(&id));
    }

    #[tokio::test]
    async fn create_load_save_delete() {
        let store = store().await;
        let mut record = record(time::Duration::hours(1));

        store.create(&mut record).await.unwrap();
        let loaded = store.load(&record.id).await.unwrap().expect("live session");
        assert_eq!(loaded.data, record.data);

        record.data.clear();
        store.save(&record).await.unwrap();
        let loaded = store.load(&record.id).await.unwrap().expect("live session");
        assert!(loaded.data.is_empty());

        store.delete(&record.id).await.unwrap();
        assert!(store.load(&record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_sessions_are_ignored_and_purged() {
        let store = store().await;
        let mut stale = record(time::Duration::seconds(-5));
        let mut live = record(time::Duration::hours(1));
        store.create(&mut stale).await.unwrap();
        store.create(&mut live).await.unwrap();

        assert!(store.load(&stale.id).await.unwrap().is_none());
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.load(&live.id).await.unwrap().is_some());
        assert!(store.load(&Id::default()).await.unwrap().is_none());
    }
}
