use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use super::{ContextRepository, RepoFuture, StoreError};
use crate::context::ConversationContext;

#[derive(Debug, Clone)]
struct StoredRecord {
    payload: Value,
    updated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Repository backed by a plain map. Used by tests and by deployments that
/// accept losing sessions on restart; mirrors the guarded-upsert ordering of
/// the Postgres store.
#[derive(Clone, Default)]
pub struct InMemoryContextRepository {
    records: Arc<Mutex<HashMap<String, StoredRecord>>>,
}

impl InMemoryContextRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.records.lock().await.contains_key(session_id)
    }

    /// Plants an arbitrary payload, bypassing serialization. Lets tests
    /// exercise the corrupt-record path.
    pub async fn insert_raw(
        &self,
        session_id: &str,
        payload: Value,
        updated_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) {
        self.records.lock().await.insert(
            session_id.to_string(),
            StoredRecord {
                payload,
                updated_at,
                expires_at,
            },
        );
    }
}

impl ContextRepository for InMemoryContextRepository {
    fn load<'a>(&'a self, session_id: &'a str) -> RepoFuture<'a, Option<ConversationContext>> {
        Box::pin(async move {
            let records = self.records.lock().await;
            records
                .get(session_id)
                .map(|record| {
                    serde_json::from_value::<ConversationContext>(record.payload.clone()).map_err(
                        |err| {
                            StoreError::InvalidData(format!("conversation context invalid: {err}"))
                        },
                    )
                })
                .transpose()
        })
    }

    fn save(&self, context: ConversationContext, expires_at: DateTime<Utc>) -> RepoFuture<'_, ()> {
        Box::pin(async move {
            let payload = serde_json::to_value(&context).map_err(|err| {
                StoreError::InvalidData(format!("conversation context not serializable: {err}"))
            })?;

            let mut records = self.records.lock().await;
            let stale = records
                .get(&context.session_id)
                .is_some_and(|existing| existing.updated_at > context.updated_at);
            if !stale {
                records.insert(
                    context.session_id.clone(),
                    StoredRecord {
                        payload,
                        updated_at: context.updated_at,
                        expires_at,
                    },
                );
            }

            Ok(())
        })
    }

    fn delete<'a>(&'a self, session_id: &'a str) -> RepoFuture<'a, ()> {
        Box::pin(async move {
            self.records.lock().await.remove(session_id);
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

            let mut records = self.records.lock().await;
            let expired_ids: Vec<String> = records
                .iter()
                .filter(|(_, record)| record.expires_at <= now)
                .map(|(session_id, _)| session_id.clone())
                .take(batch_size as usize)
                .collect();

            for session_id in &expired_ids {
                records.remove(session_id);
            }

            Ok(expired_ids.len() as u64)
        })
    }
}
