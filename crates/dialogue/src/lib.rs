pub mod config;
pub mod context;
pub mod engine;
pub mod geocoding;
pub mod intent;
pub mod localization;
pub mod location;
pub mod models;
pub mod repos;
pub mod transcription;

pub use config::{ConfidencePolicy, ConfigError, DialogueConfig, GeocodingConfig, WorkerConfig};
pub use context::{
    ContextStore, ContextSummary, ContextUpdate, ConversationContext, Interaction,
    QueryResultSnapshot, ResolvedLocation,
};
pub use engine::{DialogueEngine, DialogueError};
pub use geocoding::{GeocodedPlace, Geocoder, GeocodingError, NominatimGeocoder};
pub use intent::IntentClassifier;
pub use localization::{LocalizationProvider, PromptKey, StaticLocalizer};
pub use location::{LocationOutcome, LocationResolver};
pub use models::{
    ConfidenceLevel, FollowUpResolution, IntentCategory, IntentClassification, LocationSource,
    SafetyLevel, TurnRequest, TurnResult,
};
pub use repos::{ContextRepository, InMemoryContextRepository, Store, StoreError};
pub use transcription::{AppliedCorrection, TranscriptionCorrector, TranscriptionValidationResult};
