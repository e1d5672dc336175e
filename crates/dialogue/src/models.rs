use serde::{Deserialize, Serialize};

use crate::context::{ContextSummary, QueryResultSnapshot, ResolvedLocation};
use crate::transcription::TranscriptionValidationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    Emergency,
    ShelterSeeking,
    LegalAid,
    Counseling,
    SafetyPlanning,
    GeneralHelp,
    FollowUp,
    OffTopic,
    Unknown,
}

impl IntentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::ShelterSeeking => "shelter_seeking",
            Self::LegalAid => "legal_aid",
            Self::Counseling => "counseling",
            Self::SafetyPlanning => "safety_planning",
            Self::GeneralHelp => "general_help",
            Self::FollowUp => "follow_up",
            Self::OffTopic => "off_topic",
            Self::Unknown => "unknown",
        }
    }

    /// Intents that route the caller to nearby services and therefore need a
    /// filled location slot before downstream search can run.
    pub fn requires_location(&self) -> bool {
        matches!(self, Self::ShelterSeeking | Self::LegalAid | Self::Counseling)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    Unknown,
    Low,
    Elevated,
    Emergency,
}

impl SafetyLevel {
    pub fn rank(&self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Low => 1,
            Self::Elevated => 2,
            Self::Emergency => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Unknown,
    VeryLow,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    Context,
    Utterance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub category: IntentCategory,
    pub confidence: f64,
    pub reasoning_tags: Vec<String>,
}

/// One inbound turn from the telephony webhook layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub session_id: String,
    pub utterance: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TurnLocationResult {
    Resolved { location: ResolvedLocation },
    PromptNeeded { prompt_key: String, prompt: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum FollowUpResolution {
    Resolved { snapshot: QueryResultSnapshot },
    SnapshotExpired,
    NoSnapshot,
}

/// Turn outcome handed back to the webhook layer, which renders it into its
/// own telephony markup. `intent` is absent when the transcription was too
/// unreliable to act on and a reprompt was issued instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResult {
    pub transcription: TranscriptionValidationResult,
    pub intent: Option<IntentClassification>,
    pub location: Option<TurnLocationResult>,
    pub follow_up: Option<FollowUpResolution>,
    pub reprompt: Option<String>,
    pub context_summary: Option<ContextSummary>,
}
