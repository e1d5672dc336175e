#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dialogue::config::{DialogueConfig, GeocodingConfig};
use dialogue::engine::DialogueEngine;
use dialogue::geocoding::{GeocodedPlace, Geocoder, GeocoderFuture, GeocodingError};
use dialogue::localization::StaticLocalizer;
use dialogue::repos::InMemoryContextRepository;
use tokio::sync::Mutex;

pub struct MockGeocoder {
    replies: Mutex<VecDeque<Result<Option<GeocodedPlace>, GeocodingError>>>,
    calls: AtomicUsize,
}

impl MockGeocoder {
    pub fn with_replies(replies: Vec<Result<Option<GeocodedPlace>, GeocodingError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::from(replies)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
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

pub fn austin_place() -> GeocodedPlace {
    GeocodedPlace {
        city: Some("Austin".to_string()),
        state: Some("Texas".to_string()),
        country: Some("United States".to_string()),
        latitude: Some(30.2672),
        longitude: Some(-97.7431),
        confidence: 0.9,
    }
}

pub struct TestHarness {
    pub engine: DialogueEngine,
    pub geocoder: Arc<MockGeocoder>,
    pub repository: InMemoryContextRepository,
}

pub fn harness_with_replies(
    replies: Vec<Result<Option<GeocodedPlace>, GeocodingError>>,
) -> TestHarness {
    harness_with_config(DialogueConfig::default(), replies)
}

pub fn harness_with_config(
    config: DialogueConfig,
    replies: Vec<Result<Option<GeocodedPlace>, GeocodingError>>,
) -> TestHarness {
    let geocoder = MockGeocoder::with_replies(replies);
    let repository = InMemoryContextRepository::new();

    let engine = DialogueEngine::new(
        config,
        GeocodingConfig::default(),
        geocoder.clone(),
        Arc::new(repository.clone()),
        Arc::new(StaticLocalizer::new()),
    );

    TestHarness {
        engine,
        geocoder,
        repository,
    }
}

/// Write-behind persistence is fire-and-forget; poll until the repository
/// observes the session or the deadline passes.
pub async fn wait_until_persisted(repository: &InMemoryContextRepository, session_id: &str) {
    for _ in 0..100 {
        if repository.contains(session_id).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("context for {session_id} was never persisted");
}
