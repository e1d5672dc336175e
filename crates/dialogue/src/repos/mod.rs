use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use thiserror::Error;

use crate::context::ConversationContext;

mod memory;

pub use memory::InMemoryContextRepository;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
}

pub type RepoFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Write-behind durability port for conversation contexts. At-most-once:
/// a crash between the in-memory mutation and the persisted write loses the
/// most recent turn, which is an accepted degradation.
pub trait ContextRepository: Send + Sync {
    fn load<'a>(&'a self, session_id: &'a str) -> RepoFuture<'a, Option<ConversationContext>>;
    fn save(&self, context: ConversationContext, expires_at: DateTime<Utc>) -> RepoFuture<'_, ()>;
    fn delete<'a>(&'a self, session_id: &'a str) -> RepoFuture<'a, ()>;
    fn purge_expired(&self, now: DateTime<Utc>, batch_size: i64) -> RepoFuture<'_, u64>;
}

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let _: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../db/migrations")
            .run(&self.pool)
            .await?;
        Ok(())
    }
}

impl ContextRepository for Store {
    fn load<'a>(&'a self, session_id: &'a str) -> RepoFuture<'a, Option<ConversationContext>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT context
                 FROM conversation_contexts
                 WHERE session_id = $1",
            )
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

            row.map(|row| {
                let payload: serde_json::Value = row.try_get("context")?;
                serde_json::from_value::<ConversationContext>(payload).map_err(|err| {
                    StoreError::InvalidData(format!("conversation context invalid: {err}"))
                })
            })
            .transpose()
        })
    }

    fn save(&self, context: ConversationContext, expires_at: DateTime<Utc>) -> RepoFuture<'_, ()> {
        Box::pin(async move {
            let payload = serde_json::to_value(&context).map_err(|err| {
                StoreError::InvalidData(format!("conversation context not serializable: {err}"))
            })?;

            // Guarded upsert: per-session ordering is preserved even when
            // write-behind tasks land out of order.
            sqlx::query(
                "INSERT INTO conversation_contexts (session_id, context, updated_at, expires_at)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (session_id)
                 DO UPDATE SET
                   context = EXCLUDED.context,
                   updated_at = EXCLUDED.updated_at,
                   expires_at = EXCLUDED.expires_at
                 WHERE conversation_contexts.updated_at <= EXCLUDED.updated_at",
            )
            .bind(&context.session_id)
            .bind(payload)
            .bind(context.updated_at)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
    }

    fn delete<'a>(&'a self, session_id: &'a str) -> RepoFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query("DELETE FROM conversation_contexts WHERE session_id = $1")
                .bind(session_id)
                .execute(&self.pool)
                .await?;

            Ok(())
        })
    }

    fn purge_expired(&self, now: DateTime<Utc>, batch_size: i64) -> RepoFuture<'_, u64> {
        Box::pin(async move {
            if batch_size <= 0 {
                return Err(StoreError::InvalidData(
                    "purge batch_size must be > 0".to_string(),
                ));
            }

            let result = sqlx::query(
                "DELETE FROM conversation_contexts
                 WHERE session_id IN (
                   SELECT session_id
                   FROM conversation_contexts
                   WHERE expires_at <= $1
                   ORDER BY expires_at ASC
                   LIMIT $2
                 )",
            )
            .bind(now)
            .bind(batch_size)
            .execute(&self.pool)
            .await?;

            Ok(result.rows_affected())
        })
    }
}
