use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{DialogueConfig, GeocodingConfig};
use crate::context::{ContextStore, ContextUpdate, Interaction, QueryResultSnapshot};
use crate::geocoding::Geocoder;
use crate::intent::IntentClassifier;
use crate::localization::{DEFAULT_LANGUAGE, LocalizationProvider, PromptKey};
use crate::location::{LocationOutcome, LocationResolver};
use crate::models::{
    FollowUpResolution, IntentCategory, SafetyLevel, TurnLocationResult, TurnRequest, TurnResult,
};
use crate::repos::ContextRepository;
use crate::transcription::TranscriptionCorrector;

#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Per-turn orchestration: correction, classification, location slot
/// filling, context merge, write-behind persistence. Holds no per-session
/// state of its own; everything durable lives in the context store.
pub struct DialogueEngine {
    config: DialogueConfig,
    corrector: TranscriptionCorrector,
    classifier: IntentClassifier,
    resolver: LocationResolver,
    store: Arc<ContextStore>,
    localizer: Arc<dyn LocalizationProvider>,
}

impl DialogueEngine {
    pub fn new(
        config: DialogueConfig,
        geocoding: GeocodingConfig,
        geocoder: Arc<dyn Geocoder>,
        repository: Arc<dyn ContextRepository>,
        localizer: Arc<dyn LocalizationProvider>,
    ) -> Self {
        let corrector = TranscriptionCorrector::new(config.confidence);
        let resolver = LocationResolver::new(&config, &geocoding, geocoder);
        let store = Arc::new(ContextStore::new(config.clone(), repository));

        Self {
            config,
            corrector,
            classifier: IntentClassifier::new(),
            resolver,
            store,
            localizer,
        }
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    /// In-memory half of the session cleanup pass. Runs until aborted;
    /// expired durable rows are purged separately by the worker binary.
    pub fn spawn_context_cleanup(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let period = Duration::from_secs(self.config.sweep_interval_seconds);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let removed = store.remove_expired().await;
                if removed > 0 {
                    debug!(removed, "expired conversation contexts swept from memory");
                }
            }
        })
    }

    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnResult, DialogueError> {
        let session_id = request.session_id.trim();
        if session_id.is_empty() {
            return Err(DialogueError::InvalidInput("missing session id".to_string()));
        }
        if request.utterance.trim().is_empty() {
            return Err(DialogueError::InvalidInput("missing utterance".to_string()));
        }

        let now = Utc::now();
        let transcription = self
            .corrector
            .validate(&request.utterance, request.confidence);
        let context = self.store.get(session_id).await;
        let language = request
            .language
            .clone()
            .or_else(|| {
                context
                    .as_ref()
                    .and_then(|context| context.language.clone())
            })
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        // Too unreliable to act on: ask for a repeat, mutate nothing.
        if transcription.should_reprompt {
            debug!(session_id = %session_id, "transcription below reprompt threshold");
            let reprompt = self
                .localizer
                .prompt(&language, PromptKey::RepeatRequest, &[]);
            return Ok(TurnResult {
                transcription,
                intent: None,
                location: None,
                follow_up: None,
                reprompt: Some(reprompt),
                context_summary: context
                    .map(|context| context.summary(self.config.summary_interactions)),
            });
        }

        let intent = self
            .classifier
            .classify(&transcription.corrected, context.as_ref(), Some(language.as_str()));
        info!(
            session_id = %session_id,
            category = intent.category.as_str(),
            confidence = intent.confidence,
            "turn classified"
        );

        let follow_up = if intent.category == IntentCategory::FollowUp {
            Some(self.resolve_follow_up(context.as_ref()))
        } else {
            None
        };

        let location = if intent.category.requires_location() {
            let outcome = self
                .resolver
                .resolve(&transcription.corrected, context.as_ref(), now)
                .await;
            Some(outcome)
        } else {
            None
        };

        let mut update = ContextUpdate {
            last_intent: Some(intent.category),
            last_intent_confidence: Some(intent.confidence),
            last_query: Some(transcription.corrected.clone()),
            interaction: Some(Interaction {
                query: transcription.corrected.clone(),
                intent: intent.category,
                timestamp: now,
                response_summary: None,
            }),
            ..ContextUpdate::default()
        };
        if let Some(language) = &request.language {
            update.language = Some(language.clone());
        }
        if let Some(LocationOutcome::Resolved(resolved)) = &location {
            update.location = Some(resolved.clone());
        }
        if let Some(safety_level) = safety_level_for(intent.category) {
            update.safety_level = Some(safety_level);
        }
        if intent.category == IntentCategory::Emergency {
            update.emergency_detected = Some(true);
        }

        let updated = self.store.update(session_id, update).await;

        Ok(TurnResult {
            transcription,
            intent: Some(intent),
            location: location.map(|outcome| self.render_location(outcome, &language)),
            follow_up,
            reprompt: None,
            context_summary: Some(updated.summary(self.config.summary_interactions)),
        })
    }

    /// Installed by the downstream search layer once it has rendered results
    /// for a turn, so an immediate follow-up can reuse them.
    pub async fn record_query_result(&self, session_id: &str, snapshot: QueryResultSnapshot) {
        self.store
            .update(
                session_id,
                ContextUpdate {
                    last_query_result: Some(snapshot),
                    ..ContextUpdate::default()
                },
            )
            .await;
    }

    /// Idempotent; in-flight persistence for earlier turns still completes.
    pub async fn end_session(&self, session_id: &str) {
        self.store.clear(session_id).await;
    }

    fn resolve_follow_up(
        &self,
        context: Option<&crate::context::ConversationContext>,
    ) -> FollowUpResolution {
        let Some(context) = context else {
            return FollowUpResolution::NoSnapshot;
        };

        match context.fresh_query_result(Utc::now(), self.config.snapshot_ttl_seconds) {
            Some(snapshot) => FollowUpResolution::Resolved {
                snapshot: snapshot.clone(),
            },
            None if context.last_query_result.is_some() => FollowUpResolution::SnapshotExpired,
            None => FollowUpResolution::NoSnapshot,
        }
    }

    fn render_location(&self, outcome: LocationOutcome, language: &str) -> TurnLocationResult {
        match outcome {
            LocationOutcome::Resolved(location) => TurnLocationResult::Resolved { location },
            LocationOutcome::PromptNeeded { prompt_key } => TurnLocationResult::PromptNeeded {
                prompt_key: prompt_key.as_str().to_string(),
                prompt: self.localizer.prompt(language, prompt_key, &[]),
            },
        }
    }
}

fn safety_level_for(category: IntentCategory) -> Option<SafetyLevel> {
    match category {
        IntentCategory::Emergency => Some(SafetyLevel::Emergency),
        IntentCategory::ShelterSeeking | IntentCategory::SafetyPlanning => {
            Some(SafetyLevel::Elevated)
        }
        IntentCategory::LegalAid | IntentCategory::Counseling | IntentCategory::GeneralHelp => {
            Some(SafetyLevel::Low)
        }
        IntentCategory::FollowUp | IntentCategory::OffTopic | IntentCategory::Unknown => None,
    }
}
