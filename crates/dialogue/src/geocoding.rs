use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::GeocodingConfig;

const PROVIDER_LABEL: &str = "nominatim";

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedPlace {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub confidence: f64,
}

impl GeocodedPlace {
    pub fn has_named_component(&self) -> bool {
        self.city.is_some() || self.state.is_some() || self.country.is_some()
    }
}

#[derive(Debug, Error)]
pub enum GeocodingError {
    #[error("geocoding request timed out")]
    Timeout,
    #[error("geocoding request failed: {0}")]
    Transport(String),
    #[error("geocoding provider returned an invalid payload: {0}")]
    InvalidPayload(String),
    #[error("failed to build geocoding http client: {0}")]
    HttpClient(String),
}

pub type GeocoderFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<GeocodedPlace>, GeocodingError>> + Send + 'a>>;

/// External validation collaborator: free-text location in, scored
/// structured place out. `None` means the provider had no match.
pub trait Geocoder: Send + Sync {
    fn geocode<'a>(&'a self, location_text: &'a str) -> GeocoderFuture<'a>;
}

struct CacheSlot {
    fetched_at: Instant,
    place: Option<GeocodedPlace>,
}

pub struct NominatimGeocoder {
    client: reqwest::Client,
    config: GeocodingConfig,
    cache: Mutex<HashMap<String, CacheSlot>>,
}

impl NominatimGeocoder {
    pub fn new(config: GeocodingConfig) -> Result<Self, GeocodingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| GeocodingError::HttpClient(err.to_string()))?;

        Ok(Self {
            client,
            config,
            cache: Mutex::new(HashMap::new()),
        })
    }

    async fn fetch(&self, location_text: &str) -> Result<Option<GeocodedPlace>, GeocodingError> {
        let response = self
            .client
            .get(&self.config.search_url)
            .query(&[
                ("q", location_text),
                ("format", "jsonv2"),
                ("addressdetails", "1"),
                ("limit", "3"),
            ])
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    GeocodingError::Timeout
                } else {
                    GeocodingError::Transport("request_unavailable".to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodingError::Transport(format!(
                "status={}",
                status.as_u16()
            )));
        }

        let results: Vec<NominatimResult> = response.json().await.map_err(|_| {
            GeocodingError::InvalidPayload("response_json_parse_failed".to_string())
        })?;

        // Ambiguous hits: the provider orders by importance, keep the first.
        Ok(results.into_iter().next().map(place_from_result))
    }

    /// Inserting is also when stale slots get evicted, so the map stays
    /// bounded by the distinct locations heard within one TTL.
    async fn store_in_cache(&self, cache_key: String, place: Option<GeocodedPlace>) {
        let cache_ttl = Duration::from_secs(self.config.cache_ttl_seconds);
        let mut cache = self.cache.lock().await;
        cache.retain(|_, slot| slot.fetched_at.elapsed() < cache_ttl);
        cache.insert(
            cache_key,
            CacheSlot {
                fetched_at: Instant::now(),
                place,
            },
        );
    }
}

impl Geocoder for NominatimGeocoder {
    fn geocode<'a>(&'a self, location_text: &'a str) -> GeocoderFuture<'a> {
        Box::pin(async move {
            let cache_key = cache_key(location_text);
            let cache_ttl = Duration::from_secs(self.config.cache_ttl_seconds);

            {
                let cache = self.cache.lock().await;
                if let Some(slot) = cache.get(&cache_key)
                    && slot.fetched_at.elapsed() < cache_ttl
                {
                    debug!(key = %cache_key, "geocoding cache hit");
                    return Ok(slot.place.clone());
                }
            }

            let place = self.fetch(location_text).await?;
            self.store_in_cache(cache_key, place.clone()).await;

            Ok(place)
        })
    }
}

#[derive(Debug, Deserialize)]
struct NominatimResult {
    lat: Option<String>,
    lon: Option<String>,
    importance: Option<f64>,
    #[serde(default)]
    address: NominatimAddress,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

fn place_from_result(result: NominatimResult) -> GeocodedPlace {
    let NominatimAddress {
        city,
        town,
        village,
        state,
        country,
    } = result.address;

    GeocodedPlace {
        city: city.or(town).or(village),
        state,
        country,
        latitude: result.lat.and_then(|raw| raw.parse::<f64>().ok()),
        longitude: result.lon.and_then(|raw| raw.parse::<f64>().ok()),
        confidence: result.importance.unwrap_or(0.5).clamp(0.0, 1.0),
    }
}

fn cache_key(location_text: &str) -> String {
    let normalized = location_text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    format!("{PROVIDER_LABEL}:{normalized}")
}
