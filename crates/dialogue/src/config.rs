use std::env;

use thiserror::Error;

const DEFAULT_SESSION_TTL_SECONDS: u64 = 1800;
const DEFAULT_SNAPSHOT_TTL_SECONDS: u64 = 300;
const DEFAULT_MAX_HISTORY_ITEMS: usize = 10;
const DEFAULT_SUMMARY_INTERACTIONS: usize = 3;
const DEFAULT_LOCATION_CONFIDENCE_THRESHOLD: f64 = 0.5;
const DEFAULT_REVALIDATION_WINDOW_SECONDS: u64 = 900;
const DEFAULT_CONTEXT_SWEEP_SECONDS: u64 = 60;

const DEFAULT_HIGH_CONFIDENCE: f64 = 0.8;
const DEFAULT_MEDIUM_CONFIDENCE: f64 = 0.6;
const DEFAULT_LOW_CONFIDENCE: f64 = 0.4;
const DEFAULT_REPROMPT_BELOW_CONFIDENCE: f64 = 0.3;

const DEFAULT_GEOCODING_SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search";
const DEFAULT_GEOCODING_TIMEOUT_MS: u64 = 3000;
const DEFAULT_GEOCODING_CACHE_TTL_SECONDS: u64 = 600;
const DEFAULT_GEOCODING_USER_AGENT: &str = "support-line-dialogue/0.1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingVar(String),
    #[error("invalid integer in env var {0}")]
    ParseInt(String),
    #[error("invalid number in env var {0}")]
    ParseFloat(String),
}

/// Confidence bands applied to the recognizer's numeric score. The same
/// policy drives both the discretized level and the validity/reprompt
/// decisions, so the thresholds must be applied consistently everywhere.
#[derive(Debug, Clone, Copy)]
pub struct ConfidencePolicy {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
    pub reprompt_below: f64,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self {
            high: DEFAULT_HIGH_CONFIDENCE,
            medium: DEFAULT_MEDIUM_CONFIDENCE,
            low: DEFAULT_LOW_CONFIDENCE,
            reprompt_below: DEFAULT_REPROMPT_BELOW_CONFIDENCE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DialogueConfig {
    pub session_ttl_seconds: u64,
    pub snapshot_ttl_seconds: u64,
    pub max_history_items: usize,
    pub summary_interactions: usize,
    pub location_confidence_threshold: f64,
    pub revalidation_window_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub confidence: ConfidencePolicy,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            snapshot_ttl_seconds: DEFAULT_SNAPSHOT_TTL_SECONDS,
            max_history_items: DEFAULT_MAX_HISTORY_ITEMS,
            summary_interactions: DEFAULT_SUMMARY_INTERACTIONS,
            location_confidence_threshold: DEFAULT_LOCATION_CONFIDENCE_THRESHOLD,
            revalidation_window_seconds: DEFAULT_REVALIDATION_WINDOW_SECONDS,
            sweep_interval_seconds: DEFAULT_CONTEXT_SWEEP_SECONDS,
            confidence: ConfidencePolicy::default(),
        }
    }
}

impl DialogueConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            session_ttl_seconds: parse_u64_env("SESSION_TTL_SECONDS", DEFAULT_SESSION_TTL_SECONDS)?,
            snapshot_ttl_seconds: parse_u64_env(
                "QUERY_SNAPSHOT_TTL_SECONDS",
                DEFAULT_SNAPSHOT_TTL_SECONDS,
            )?,
            max_history_items: parse_usize_env("MAX_HISTORY_ITEMS", DEFAULT_MAX_HISTORY_ITEMS)?,
            summary_interactions: parse_usize_env(
                "SUMMARY_INTERACTIONS",
                DEFAULT_SUMMARY_INTERACTIONS,
            )?,
            location_confidence_threshold: parse_f64_env(
                "LOCATION_CONFIDENCE_THRESHOLD",
                DEFAULT_LOCATION_CONFIDENCE_THRESHOLD,
            )?,
            revalidation_window_seconds: parse_u64_env(
                "LOCATION_REVALIDATION_WINDOW_SECONDS",
                DEFAULT_REVALIDATION_WINDOW_SECONDS,
            )?,
            sweep_interval_seconds: parse_u64_env(
                "CONTEXT_SWEEP_SECONDS",
                DEFAULT_CONTEXT_SWEEP_SECONDS,
            )?,
            confidence: ConfidencePolicy {
                high: parse_f64_env("CONFIDENCE_HIGH_THRESHOLD", DEFAULT_HIGH_CONFIDENCE)?,
                medium: parse_f64_env("CONFIDENCE_MEDIUM_THRESHOLD", DEFAULT_MEDIUM_CONFIDENCE)?,
                low: parse_f64_env("CONFIDENCE_LOW_THRESHOLD", DEFAULT_LOW_CONFIDENCE)?,
                reprompt_below: parse_f64_env(
                    "CONFIDENCE_REPROMPT_THRESHOLD",
                    DEFAULT_REPROMPT_BELOW_CONFIDENCE,
                )?,
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct GeocodingConfig {
    pub search_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub min_confidence: f64,
    pub cache_ttl_seconds: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            search_url: DEFAULT_GEOCODING_SEARCH_URL.to_string(),
            user_agent: DEFAULT_GEOCODING_USER_AGENT.to_string(),
            timeout_ms: DEFAULT_GEOCODING_TIMEOUT_MS,
            min_confidence: DEFAULT_LOCATION_CONFIDENCE_THRESHOLD,
            cache_ttl_seconds: DEFAULT_GEOCODING_CACHE_TTL_SECONDS,
        }
    }
}

impl GeocodingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            search_url: env::var("GEOCODING_SEARCH_URL")
                .unwrap_or_else(|_| DEFAULT_GEOCODING_SEARCH_URL.to_string()),
            user_agent: env::var("GEOCODING_USER_AGENT")
                .unwrap_or_else(|_| DEFAULT_GEOCODING_USER_AGENT.to_string()),
            timeout_ms: parse_u64_env("GEOCODING_TIMEOUT_MS", DEFAULT_GEOCODING_TIMEOUT_MS)?,
            min_confidence: parse_f64_env(
                "GEOCODING_MIN_CONFIDENCE",
                DEFAULT_LOCATION_CONFIDENCE_THRESHOLD,
            )?,
            cache_ttl_seconds: parse_u64_env(
                "GEOCODING_CACHE_TTL_SECONDS",
                DEFAULT_GEOCODING_CACHE_TTL_SECONDS,
            )?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub tick_seconds: u64,
    pub database_url: String,
    pub database_max_connections: u32,
    pub purge_batch_size: u32,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            tick_seconds: parse_u64_env("WORKER_TICK_SECONDS", 60)?,
            database_url: require_env("DATABASE_URL")?,
            database_max_connections: parse_u32_env("DATABASE_MAX_CONNECTIONS", 5)?,
            purge_batch_size: parse_u32_env("CONTEXT_PURGE_BATCH_SIZE", 500)?,
        })
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
}

fn parse_u32_env(key: &str, default: u32) -> Result<u32, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<u32>()
            .map_err(|_| ConfigError::ParseInt(key.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_u64_env(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|_| ConfigError::ParseInt(key.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_usize_env(key: &str, default: usize) -> Result<usize, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<usize>()
            .map_err(|_| ConfigError::ParseInt(key.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_f64_env(key: &str, default: f64) -> Result<f64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<f64>()
            .map_err(|_| ConfigError::ParseFloat(key.to_string())),
        Err(_) => Ok(default),
    }
}
