mod support;

use chrono::{Duration, Utc};
use dialogue::context::{ContextUpdate, QueryResultSnapshot};
use dialogue::models::{
    FollowUpResolution, IntentCategory, LocationSource, SafetyLevel, TurnLocationResult,
    TurnRequest,
};

use support::{austin_place, harness_with_replies, wait_until_persisted};

fn turn(session_id: &str, utterance: &str) -> TurnRequest {
    TurnRequest {
        session_id: session_id.to_string(),
        utterance: utterance.to_string(),
        confidence: Some(0.9),
        language: None,
    }
}

#[tokio::test]
async fn rejects_blank_session_and_blank_utterance() {
    let harness = harness_with_replies(vec![]);

    let blank_session = harness.engine.handle_turn(turn("   ", "I need help")).await;
    assert!(blank_session.is_err());

    let blank_utterance = harness.engine.handle_turn(turn("session-1", "   ")).await;
    assert!(blank_utterance.is_err());
}

#[tokio::test]
async fn emergency_turn_escalates_safety_and_sticks() {
    let harness = harness_with_replies(vec![]);

    let result = harness
        .engine
        .handle_turn(turn("session-emergency", "I'm in danger, he has a gun"))
        .await
        .unwrap();

    let intent = result.intent.unwrap();
    assert_eq!(intent.category, IntentCategory::Emergency);

    let summary = result.context_summary.unwrap();
    assert_eq!(summary.safety_level, SafetyLevel::Emergency);
    assert!(summary.emergency_detected);

    // A later benign turn must not lower the level or drop the flag.
    let later = harness
        .engine
        .handle_turn(turn("session-emergency", "I need some information"))
        .await
        .unwrap();
    let summary = later.context_summary.unwrap();
    assert_eq!(summary.safety_level, SafetyLevel::Emergency);
    assert!(summary.emergency_detected);
}

#[tokio::test]
async fn shelter_turn_resolves_location_from_utterance() {
    let harness = harness_with_replies(vec![Ok(Some(austin_place()))]);

    let result = harness
        .engine
        .handle_turn(turn("session-shelter", "I need shelter in Austin, Texas"))
        .await
        .unwrap();

    let intent = result.intent.unwrap();
    assert_eq!(intent.category, IntentCategory::ShelterSeeking);

    match result.location.unwrap() {
        TurnLocationResult::Resolved { location } => {
            assert_eq!(location.city.as_deref(), Some("Austin"));
            assert_eq!(location.source, LocationSource::Utterance);
        }
        other => panic!("expected resolved location, got {other:?}"),
    }

    wait_until_persisted(&harness.repository, "session-shelter").await;
}

#[tokio::test]
async fn second_turn_reuses_context_location_without_geocoding() {
    let harness = harness_with_replies(vec![Ok(Some(austin_place()))]);

    harness
        .engine
        .handle_turn(turn("session-reuse", "I need shelter in Austin, Texas"))
        .await
        .unwrap();
    assert_eq!(harness.geocoder.call_count(), 1);

    let result = harness
        .engine
        .handle_turn(turn("session-reuse", "I need a shelter close by tonight"))
        .await
        .unwrap();

    match result.location.unwrap() {
        TurnLocationResult::Resolved { location } => {
            assert_eq!(location.city.as_deref(), Some("Austin"));
        }
        other => panic!("expected resolved location, got {other:?}"),
    }
    assert_eq!(harness.geocoder.call_count(), 1);
}

#[tokio::test]
async fn spanish_first_turn_classifies_and_prompts_in_spanish() {
    let harness = harness_with_replies(vec![]);

    let mut request = turn("session-es", "necesito un refugio para esta noche");
    request.language = Some("es".to_string());

    let result = harness.engine.handle_turn(request).await.unwrap();

    let intent = result.intent.unwrap();
    assert_eq!(intent.category, IntentCategory::ShelterSeeking);

    match result.location.unwrap() {
        TurnLocationResult::PromptNeeded { prompt_key, prompt } => {
            assert_eq!(prompt_key, "ask_location");
            assert!(prompt.contains("ciudad"));
        }
        other => panic!("expected location prompt, got {other:?}"),
    }

    let summary = result.context_summary.unwrap();
    assert_eq!(summary.language.as_deref(), Some("es"));
}

#[tokio::test]
async fn unreliable_transcription_reprompts_without_touching_context() {
    let harness = harness_with_replies(vec![]);

    let mut request = turn("session-garbled", "I need a shelter");
    request.confidence = Some(0.2);

    let result = harness.engine.handle_turn(request).await.unwrap();

    assert!(result.intent.is_none());
    assert!(result.location.is_none());
    assert!(result.reprompt.is_some());
    assert!(result.context_summary.is_none());

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(harness.repository.is_empty().await);
    assert!(harness.engine.store().get("session-garbled").await.is_none());
}

#[tokio::test]
async fn follow_up_reuses_fresh_query_result() {
    let harness = harness_with_replies(vec![Ok(Some(austin_place()))]);

    harness
        .engine
        .handle_turn(turn("session-follow", "I need shelter in Austin, Texas"))
        .await
        .unwrap();

    harness
        .engine
        .record_query_result(
            "session-follow",
            QueryResultSnapshot {
                intent: IntentCategory::ShelterSeeking,
                location: Some(austin_resolved()),
                result_items: vec!["Safe Haven Shelter".to_string()],
                raw_voice_text: "I found one shelter near Austin.".to_string(),
                raw_display_text: "Safe Haven Shelter, Austin TX".to_string(),
                captured_at: Utc::now(),
            },
        )
        .await;

    let result = harness
        .engine
        .handle_turn(turn("session-follow", "what about more options"))
        .await
        .unwrap();

    let intent = result.intent.unwrap();
    assert_eq!(intent.category, IntentCategory::FollowUp);

    match result.follow_up.unwrap() {
        FollowUpResolution::Resolved { snapshot } => {
            assert_eq!(snapshot.result_items, vec!["Safe Haven Shelter".to_string()]);
        }
        other => panic!("expected resolved follow-up, got {other:?}"),
    }
}

#[tokio::test]
async fn follow_up_on_stale_snapshot_reports_expiry() {
    let harness = harness_with_replies(vec![]);

    harness
        .engine
        .store()
        .update(
            "session-stale",
            ContextUpdate {
                last_intent: Some(IntentCategory::ShelterSeeking),
                last_query_result: Some(QueryResultSnapshot {
                    intent: IntentCategory::ShelterSeeking,
                    location: None,
                    result_items: vec!["Safe Haven Shelter".to_string()],
                    raw_voice_text: "I found one shelter.".to_string(),
                    raw_display_text: "Safe Haven Shelter".to_string(),
                    captured_at: Utc::now() - Duration::seconds(400),
                }),
                ..ContextUpdate::default()
            },
        )
        .await;

    let result = harness
        .engine
        .handle_turn(turn("session-stale", "what about more options"))
        .await
        .unwrap();

    assert!(matches!(
        result.follow_up,
        Some(FollowUpResolution::SnapshotExpired)
    ));
}

#[tokio::test]
async fn cleanup_task_sweeps_expired_sessions_from_memory() {
    let config = dialogue::config::DialogueConfig {
        session_ttl_seconds: 0,
        sweep_interval_seconds: 1,
        ..dialogue::config::DialogueConfig::default()
    };
    let harness = support::harness_with_config(config, vec![]);

    harness
        .engine
        .handle_turn(turn("session-swept", "I need some information"))
        .await
        .unwrap();
    wait_until_persisted(&harness.repository, "session-swept").await;
    assert_eq!(harness.engine.store().tracked_sessions().await, 1);

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let cleanup = harness.engine.spawn_context_cleanup();

    // The first sweep fires immediately on spawn.
    let mut swept = false;
    for _ in 0..100 {
        if harness.engine.store().tracked_sessions().await == 0
            && harness.repository.is_empty().await
        {
            swept = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    cleanup.abort();

    assert!(swept, "expired session was never swept from memory");
}

fn austin_resolved() -> dialogue::context::ResolvedLocation {
    dialogue::context::ResolvedLocation {
        raw: "Austin, Texas".to_string(),
        city: Some("Austin".to_string()),
        state: Some("Texas".to_string()),
        country: Some("United States".to_string()),
        latitude: Some(30.2672),
        longitude: Some(-97.7431),
        confidence: 0.9,
        source: LocationSource::Utterance,
        validated_at: Utc::now(),
    }
}
