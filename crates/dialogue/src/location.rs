use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use tracing::debug;

use crate::config::{DialogueConfig, GeocodingConfig};
use crate::context::{ConversationContext, ResolvedLocation};
use crate::geocoding::Geocoder;
use crate::localization::PromptKey;
use crate::models::LocationSource;

#[derive(Debug, Clone, PartialEq)]
pub enum LocationOutcome {
    Resolved(ResolvedLocation),
    PromptNeeded { prompt_key: PromptKey },
}

/// Confidence-gated slot filling for the location required by routing
/// intents. A candidate from the session context is always tried before
/// re-parsing the current utterance: a previously confirmed location is
/// cheaper to trust than noisy speech.
pub struct LocationResolver {
    geocoder: Arc<dyn Geocoder>,
    required_confidence: f64,
    revalidation_window_seconds: u64,
    extractors: Vec<Regex>,
}

impl LocationResolver {
    pub fn new(
        config: &DialogueConfig,
        geocoding: &GeocodingConfig,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        let extractors = [
            // "in/at/near <Capitalized phrase>[, <Region>]"
            r"\b(?:[Ii]n|[Aa]t|[Nn]ear)\s+([A-Z][A-Za-z]+(?:\s+[A-Z][A-Za-z]+)*(?:,\s*(?:[A-Z]{2}|[A-Z][A-Za-z]+))?)",
            // "city of <phrase>"
            r"\b[Cc]ity\s+of\s+([A-Z][A-Za-z]+(?:\s+[A-Z][A-Za-z]+)*)",
            // "<phrase>, <two-letter region>"
            r"\b([A-Z][A-Za-z]+(?:\s+[A-Z][A-Za-z]+)*,\s*[A-Z]{2})\b",
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("invalid location extractor pattern"))
        .collect();

        Self {
            geocoder,
            required_confidence: geocoding
                .min_confidence
                .max(config.location_confidence_threshold),
            revalidation_window_seconds: config.revalidation_window_seconds,
            extractors,
        }
    }

    pub async fn resolve(
        &self,
        utterance: &str,
        context: Option<&ConversationContext>,
        now: DateTime<Utc>,
    ) -> LocationOutcome {
        if let Some(stored) = context.and_then(|context| context.location.as_ref()) {
            let age = now - stored.validated_at;
            if age <= Duration::seconds(self.revalidation_window_seconds as i64) {
                return LocationOutcome::Resolved(stored.clone());
            }

            // Stale geodata: run the stored raw string through validation
            // again before acting on it.
            if let Some(location) = self
                .validate_candidate(&stored.raw, LocationSource::Context, now)
                .await
            {
                return LocationOutcome::Resolved(location);
            }
            debug!(raw = %stored.raw, "stored location failed revalidation");
        }

        let Some(candidate) = self.extract_candidate(utterance) else {
            return LocationOutcome::PromptNeeded {
                prompt_key: PromptKey::AskLocation,
            };
        };

        match self
            .validate_candidate(&candidate, LocationSource::Utterance, now)
            .await
        {
            Some(location) => LocationOutcome::Resolved(location),
            None => LocationOutcome::PromptNeeded {
                prompt_key: PromptKey::AskLocationRetry,
            },
        }
    }

    pub fn extract_candidate(&self, utterance: &str) -> Option<String> {
        for extractor in &self.extractors {
            if let Some(captures) = extractor.captures(utterance) {
                let candidate = captures
                    .get(1)
                    .map(|group| group.as_str().trim_end_matches(['.', '?', '!']).trim())
                    .filter(|candidate| !candidate.is_empty());
                if let Some(candidate) = candidate {
                    return Some(candidate.to_string());
                }
            }
        }

        None
    }

    async fn validate_candidate(
        &self,
        raw: &str,
        source: LocationSource,
        now: DateTime<Utc>,
    ) -> Option<ResolvedLocation> {
        match self.geocoder.geocode(raw).await {
            Ok(Some(place))
                if place.has_named_component() && place.confidence >= self.required_confidence =>
            {
                Some(ResolvedLocation {
                    raw: raw.to_string(),
                    city: place.city,
                    state: place.state,
                    country: place.country,
                    latitude: place.latitude,
                    longitude: place.longitude,
                    confidence: place.confidence,
                    source,
                    validated_at: now,
                })
            }
            Ok(Some(place)) => {
                debug!(
                    raw = %raw,
                    confidence = place.confidence,
                    "geocoding candidate rejected"
                );
                None
            }
            Ok(None) => None,
            // Timeouts and transport failures read as "no match"; the caller
            // degrades to a prompt instead of surfacing a hard error.
            Err(err) => {
                debug!(raw = %raw, "geocoding failed: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Mutex;

    use super::*;
    use crate::geocoding::{GeocodedPlace, GeocoderFuture, GeocodingError};

    struct MockGeocoder {
        replies: Mutex<VecDeque<Result<Option<GeocodedPlace>, GeocodingError>>>,
        calls: AtomicUsize,
    }

    impl MockGeocoder {
        fn with_replies(replies: Vec<Result<Option<GeocodedPlace>, GeocodingError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::from(replies)),
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Geocoder for MockGeocoder {
        fn geocode<'a>(&'a self, _location_text: &'a str) -> GeocoderFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.replies.lock().await.pop_front().unwrap_or(Ok(None))
            })
        }
    }

    fn austin_place() -> GeocodedPlace {
        GeocodedPlace {
            city: Some("Austin".to_string()),
            state: Some("Texas".to_string()),
            country: Some("United States".to_string()),
            latitude: Some(30.2672),
            longitude: Some(-97.7431),
            confidence: 0.9,
        }
    }

    fn resolver(geocoder: Arc<MockGeocoder>) -> LocationResolver {
        LocationResolver::new(
            &DialogueConfig::default(),
            &GeocodingConfig::default(),
            geocoder,
        )
    }

    fn context_with_location(validated_at: DateTime<Utc>) -> ConversationContext {
        let now = Utc::now();
        let mut context = ConversationContext::new("sess-1", now);
        context.location = Some(ResolvedLocation {
            raw: "Austin, Texas".to_string(),
            city: Some("Austin".to_string()),
            state: Some("Texas".to_string()),
            country: Some("United States".to_string()),
            latitude: Some(30.2672),
            longitude: Some(-97.7431),
            confidence: 0.9,
            source: LocationSource::Utterance,
            validated_at,
        });
        context
    }

    #[test]
    fn extracts_prepositional_location_phrases() {
        let resolver = resolver(MockGeocoder::with_replies(Vec::new()));

        assert_eq!(
            resolver.extract_candidate("I need shelter in Austin, Texas"),
            Some("Austin, Texas".to_string())
        );
        assert_eq!(
            resolver.extract_candidate("we live near Round Rock"),
            Some("Round Rock".to_string())
        );
        assert_eq!(
            resolver.extract_candidate("somewhere in the city of San Antonio"),
            Some("San Antonio".to_string())
        );
        assert_eq!(
            resolver.extract_candidate("Portland, OR is where I am"),
            Some("Portland, OR".to_string())
        );
        assert_eq!(resolver.extract_candidate("Can you help me"), None);
    }

    #[tokio::test]
    async fn fresh_context_location_short_circuits_the_geocoder() {
        let geocoder = MockGeocoder::with_replies(Vec::new());
        let resolver = resolver(geocoder.clone());
        let context = context_with_location(Utc::now());

        let outcome = resolver
            .resolve("can you find one for me", Some(&context), Utc::now())
            .await;

        match outcome {
            LocationOutcome::Resolved(location) => {
                assert_eq!(location.city.as_deref(), Some("Austin"));
            }
            other => panic!("expected resolved outcome, got {other:?}"),
        }
        assert_eq!(geocoder.call_count(), 0);
    }

    #[tokio::test]
    async fn stale_context_location_is_revalidated() {
        let geocoder = MockGeocoder::with_replies(vec![Ok(Some(austin_place()))]);
        let resolver = resolver(geocoder.clone());
        let stale = Utc::now() - Duration::seconds(3600);
        let context = context_with_location(stale);

        let outcome = resolver
            .resolve("can you find one for me", Some(&context), Utc::now())
            .await;

        match outcome {
            LocationOutcome::Resolved(location) => {
                assert_eq!(location.source, LocationSource::Context);
                assert!(location.validated_at > stale);
            }
            other => panic!("expected resolved outcome, got {other:?}"),
        }
        assert_eq!(geocoder.call_count(), 1);
    }

    #[tokio::test]
    async fn utterance_candidate_resolves_when_geocoder_accepts() {
        let geocoder = MockGeocoder::with_replies(vec![Ok(Some(austin_place()))]);
        let resolver = resolver(geocoder.clone());

        let outcome = resolver
            .resolve("I need shelter in Austin, Texas", None, Utc::now())
            .await;

        match outcome {
            LocationOutcome::Resolved(location) => {
                assert_eq!(location.raw, "Austin, Texas");
                assert_eq!(location.source, LocationSource::Utterance);
                assert_eq!(location.state.as_deref(), Some("Texas"));
            }
            other => panic!("expected resolved outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_location_phrase_prompts_without_calling_the_geocoder() {
        let geocoder = MockGeocoder::with_replies(Vec::new());
        let resolver = resolver(geocoder.clone());

        let outcome = resolver.resolve("Can you help me", None, Utc::now()).await;

        assert_eq!(
            outcome,
            LocationOutcome::PromptNeeded {
                prompt_key: PromptKey::AskLocation
            }
        );
        assert_eq!(geocoder.call_count(), 0);
    }

    #[tokio::test]
    async fn geocoding_timeout_degrades_to_prompt() {
        let geocoder = MockGeocoder::with_replies(vec![Err(GeocodingError::Timeout)]);
        let resolver = resolver(geocoder.clone());

        let outcome = resolver
            .resolve("I'm in Springfield", None, Utc::now())
            .await;

        assert_eq!(
            outcome,
            LocationOutcome::PromptNeeded {
                prompt_key: PromptKey::AskLocationRetry
            }
        );
    }

    #[tokio::test]
    async fn low_confidence_geocode_is_rejected() {
        let mut place = austin_place();
        place.confidence = 0.2;
        let geocoder = MockGeocoder::with_replies(vec![Ok(Some(place))]);
        let resolver = resolver(geocoder.clone());

        let outcome = resolver
            .resolve("I'm in Austin, Texas", None, Utc::now())
            .await;

        assert_eq!(
            outcome,
            LocationOutcome::PromptNeeded {
                prompt_key: PromptKey::AskLocationRetry
            }
        );
    }
}
