use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::config::DialogueConfig;
use crate::models::{IntentCategory, LocationSource, SafetyLevel};
use crate::repos::{ContextRepository, StoreError};

pub const CONTEXT_SCHEMA_VERSION_V1: &str = "2026-08-20";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Interaction {
    pub query: String,
    pub intent: IntentCategory,
    pub timestamp: DateTime<Utc>,
    pub response_summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolvedLocation {
    pub raw: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub confidence: f64,
    pub source: LocationSource,
    pub validated_at: DateTime<Utc>,
}

/// Snapshot of the most recent downstream query result, kept only long
/// enough to answer an immediate follow-up turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryResultSnapshot {
    pub intent: IntentCategory,
    pub location: Option<ResolvedLocation>,
    pub result_items: Vec<String>,
    pub raw_voice_text: String,
    pub raw_display_text: String,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationContext {
    pub version: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub history: Vec<Interaction>,
    pub location: Option<ResolvedLocation>,
    pub family_concerns: Option<String>,
    pub emotional_tone: Option<String>,
    pub language: Option<String>,
    pub last_intent: IntentCategory,
    pub last_intent_confidence: f64,
    pub last_query: Option<String>,
    pub last_query_result: Option<QueryResultSnapshot>,
    pub safety_level: SafetyLevel,
    pub emergency_detected: bool,
}

impl ConversationContext {
    pub fn new(session_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            version: CONTEXT_SCHEMA_VERSION_V1.to_string(),
            session_id: session_id.into(),
            created_at: now,
            updated_at: now,
            history: Vec::new(),
            location: None,
            family_concerns: None,
            emotional_tone: None,
            language: None,
            last_intent: IntentCategory::Unknown,
            last_intent_confidence: 0.0,
            last_query: None,
            last_query_result: None,
            safety_level: SafetyLevel::Unknown,
            emergency_detected: false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl_seconds: u64) -> bool {
        now - self.updated_at > Duration::seconds(ttl_seconds as i64)
    }

    /// The snapshot has its own, shorter TTL; a stale one must never answer
    /// a follow-up.
    pub fn fresh_query_result(
        &self,
        now: DateTime<Utc>,
        snapshot_ttl_seconds: u64,
    ) -> Option<&QueryResultSnapshot> {
        self.last_query_result.as_ref().filter(|snapshot| {
            now - snapshot.captured_at <= Duration::seconds(snapshot_ttl_seconds as i64)
        })
    }

    /// Merge semantics: only supplied fields change. The safety level only
    /// ever goes up and the emergency flag is sticky for the session.
    pub fn apply_update(&mut self, update: ContextUpdate, now: DateTime<Utc>, max_history: usize) {
        if let Some(location) = update.location {
            self.location = Some(location);
        }
        if let Some(family_concerns) = update.family_concerns {
            self.family_concerns = Some(family_concerns);
        }
        if let Some(emotional_tone) = update.emotional_tone {
            self.emotional_tone = Some(emotional_tone);
        }
        if let Some(language) = update.language {
            self.language = Some(language);
        }
        if let Some(last_intent) = update.last_intent {
            self.last_intent = last_intent;
        }
        if let Some(last_intent_confidence) = update.last_intent_confidence {
            self.last_intent_confidence = last_intent_confidence;
        }
        if let Some(last_query) = update.last_query {
            self.last_query = Some(last_query);
        }
        if let Some(last_query_result) = update.last_query_result {
            self.last_query_result = Some(last_query_result);
        }
        if let Some(safety_level) = update.safety_level
            && safety_level.rank() > self.safety_level.rank()
        {
            self.safety_level = safety_level;
        }
        if update.emergency_detected == Some(true) {
            self.emergency_detected = true;
        }
        if let Some(interaction) = update.interaction {
            self.history.push(interaction);
            if self.history.len() > max_history {
                let excess = self.history.len() - max_history;
                self.history.drain(..excess);
            }
        }

        self.updated_at = now;
    }

    pub fn summary(&self, recent: usize) -> ContextSummary {
        let skip = self.history.len().saturating_sub(recent);
        ContextSummary {
            session_id: self.session_id.clone(),
            recent_interactions: self.history[skip..].to_vec(),
            location: self.location.clone(),
            language: self.language.clone(),
            last_intent: self.last_intent,
            safety_level: self.safety_level,
            emergency_detected: self.emergency_detected,
        }
    }
}

/// Reduced view of a context used to enrich downstream generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub session_id: String,
    pub recent_interactions: Vec<Interaction>,
    pub location: Option<ResolvedLocation>,
    pub language: Option<String>,
    pub last_intent: IntentCategory,
    pub safety_level: SafetyLevel,
    pub emergency_detected: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ContextUpdate {
    pub location: Option<ResolvedLocation>,
    pub family_concerns: Option<String>,
    pub emotional_tone: Option<String>,
    pub language: Option<String>,
    pub last_intent: Option<IntentCategory>,
    pub last_intent_confidence: Option<f64>,
    pub last_query: Option<String>,
    pub last_query_result: Option<QueryResultSnapshot>,
    pub safety_level: Option<SafetyLevel>,
    pub emergency_detected: Option<bool>,
    pub interaction: Option<Interaction>,
}

type SessionSlot = Arc<Mutex<Option<ConversationContext>>>;

/// Per-session conversational state. A session is a single-writer-at-a-time
/// resource: every operation for one id goes through that session's slot
/// lock, while distinct sessions proceed concurrently. The in-memory copy is
/// authoritative; durable writes are best-effort and happen behind the turn.
pub struct ContextStore {
    config: DialogueConfig,
    repository: Arc<dyn ContextRepository>,
    slots: Mutex<HashMap<String, SessionSlot>>,
}

impl ContextStore {
    pub fn new(config: DialogueConfig, repository: Arc<dyn ContextRepository>) -> Self {
        Self {
            config,
            repository,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Expired and missing are indistinguishable to callers; expiry deletes
    /// lazily from both memory and durable storage.
    pub async fn get(&self, session_id: &str) -> Option<ConversationContext> {
        let slot = self.slot(session_id).await;
        let mut guard = slot.lock().await;
        let context = self.fresh_context(session_id, &mut guard, Utc::now()).await;
        drop(guard);

        // Absent or expired: drop the slot so the map does not accumulate
        // an entry per session id ever looked up.
        if context.is_none() {
            self.release_empty_slot(session_id).await;
        }
        context
    }

    pub async fn update(&self, session_id: &str, update: ContextUpdate) -> ConversationContext {
        let now = Utc::now();
        let slot = self.slot(session_id).await;
        let mut guard = slot.lock().await;

        let mut context = self
            .fresh_context(session_id, &mut guard, now)
            .await
            .unwrap_or_else(|| ConversationContext::new(session_id, now));
        context.apply_update(update, now, self.config.max_history_items);
        *guard = Some(context.clone());
        drop(guard);

        self.persist_write_behind(context.clone());
        context
    }

    pub async fn clear(&self, session_id: &str) {
        {
            let mut slots = self.slots.lock().await;
            slots.remove(session_id);
        }
        self.delete_persisted(session_id).await;
    }

    pub async fn summary(&self, session_id: &str) -> Option<ContextSummary> {
        self.get(session_id)
            .await
            .map(|context| context.summary(self.config.summary_interactions))
    }

    /// In-memory half of the cleanup pass: drops expired slots and removes
    /// their persisted copies. Safe to call from any number of places.
    pub async fn remove_expired(&self) -> usize {
        let now = Utc::now();
        let mut expired_ids = Vec::new();

        {
            let mut slots = self.slots.lock().await;
            slots.retain(|session_id, slot| {
                let Ok(mut guard) = slot.try_lock() else {
                    // Busy slot: a turn is mid-flight, let it observe expiry.
                    return true;
                };
                let expired = match guard.as_ref() {
                    Some(context) => context.is_expired(now, self.config.session_ttl_seconds),
                    None => true,
                };
                if expired {
                    *guard = None;
                    expired_ids.push(session_id.clone());
                }
                !expired
            });
        }

        for session_id in &expired_ids {
            self.delete_persisted(session_id).await;
        }

        expired_ids.len()
    }

    /// Number of session slots currently tracked in memory.
    pub async fn tracked_sessions(&self) -> usize {
        self.slots.lock().await.len()
    }

    async fn slot(&self, session_id: &str) -> SessionSlot {
        let mut slots = self.slots.lock().await;
        slots
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Removes the slot only while it is provably empty; a concurrent
    /// update that just filled it keeps its entry.
    async fn release_empty_slot(&self, session_id: &str) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get(session_id).cloned()
            && let Ok(guard) = slot.try_lock()
            && guard.is_none()
        {
            slots.remove(session_id);
        }
    }

    async fn fresh_context(
        &self,
        session_id: &str,
        guard: &mut Option<ConversationContext>,
        now: DateTime<Utc>,
    ) -> Option<ConversationContext> {
        if let Some(context) = guard.as_ref() {
            if !context.is_expired(now, self.config.session_ttl_seconds) {
                return Some(context.clone());
            }
            *guard = None;
            self.delete_persisted(session_id).await;
            return None;
        }

        match self.repository.load(session_id).await {
            Ok(Some(context)) => {
                if context.is_expired(now, self.config.session_ttl_seconds) {
                    self.delete_persisted(session_id).await;
                    return None;
                }
                *guard = Some(context.clone());
                Some(context)
            }
            Ok(None) => None,
            Err(StoreError::InvalidData(reason)) => {
                // Corrupted persisted record: discard it, treat as absent.
                warn!(session_id = %session_id, reason = %reason, "discarding corrupt persisted context");
                self.delete_persisted(session_id).await;
                None
            }
            Err(err) => {
                error!(session_id = %session_id, "failed to load persisted context: {err}");
                None
            }
        }
    }

    fn persist_write_behind(&self, context: ConversationContext) {
        let repository = Arc::clone(&self.repository);
        let expires_at =
            context.updated_at + Duration::seconds(self.config.session_ttl_seconds as i64);

        // Fire-and-forget: a late arrival cannot overtake a newer write
        // because the repository upsert is guarded on updated_at.
        tokio::spawn(async move {
            let session_id = context.session_id.clone();
            if let Err(err) = repository.save(context, expires_at).await {
                error!(session_id = %session_id, "failed to persist context: {err}");
            } else {
                debug!(session_id = %session_id, "context persisted");
            }
        });
    }

    async fn delete_persisted(&self, session_id: &str) {
        if let Err(err) = self.repository.delete(session_id).await {
            error!(session_id = %session_id, "failed to delete persisted context: {err}");
        }
    }
}
