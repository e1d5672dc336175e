use crate::context::ConversationContext;
use crate::models::{IntentCategory, IntentClassification};

const BASE_CONFIDENCE: f64 = 0.5;
const LONG_UTTERANCE_TOKENS: usize = 6;
const FOLLOW_UP_MAX_TOKENS: usize = 5;

const EMERGENCY_KEYWORDS: &[&str] = &[
    "danger",
    "911",
    "emergency",
    "right now",
    "hurting me",
    "hurt me",
    "going to kill",
    "weapon",
    "he has a gun",
    "help me now",
];
const SHELTER_KEYWORDS: &[&str] = &[
    "shelter",
    "place to stay",
    "somewhere to go",
    "somewhere to stay",
    "housing",
    "refuge",
    "safe house",
];
const LEGAL_KEYWORDS: &[&str] = &[
    "lawyer",
    "attorney",
    "restraining order",
    "protective order",
    "protection order",
    "custody",
    "legal help",
    "legal aid",
    "court",
];
const COUNSELING_KEYWORDS: &[&str] = &[
    "counselor",
    "counseling",
    "therapist",
    "therapy",
    "someone to talk",
    "talk to someone",
    "support group",
];
const SAFETY_PLANNING_KEYWORDS: &[&str] = &[
    "safety plan",
    "stay safe",
    "protect myself",
    "escape plan",
    "leave safely",
    "plan to leave",
];
const GENERAL_HELP_KEYWORDS: &[&str] = &["help", "resources", "information", "assistance", "support"];
const FOLLOW_UP_MARKERS: &[&str] = &[
    "what about",
    "how about",
    "also",
    "more",
    "another",
    "else",
    "those",
    "them",
];
const OFF_TOPIC_KEYWORDS: &[&str] = &["weather", "sports", "joke", "pizza", "movie", "music"];

const EMERGENCY_KEYWORDS_ES: &[&str] = &["peligro", "emergencia", "me va a matar", "ahora mismo"];
const SHELTER_KEYWORDS_ES: &[&str] = &["refugio", "albergue", "donde quedarme", "un lugar seguro"];
const LEGAL_KEYWORDS_ES: &[&str] = &["abogado", "abogada", "orden de proteccion", "custodia"];
const COUNSELING_KEYWORDS_ES: &[&str] = &["consejero", "consejera", "terapia", "hablar con alguien"];
const SAFETY_PLANNING_KEYWORDS_ES: &[&str] = &["plan de seguridad", "protegerme", "salir segura"];
const GENERAL_HELP_KEYWORDS_ES: &[&str] = &["ayuda", "recursos", "informacion", "apoyo"];

const REQUEST_VERBS: &[&str] = &["need", "want", "looking for", "help me", "find", "necesito", "busco"];
const HEDGING_WORDS: &[&str] = &["maybe", "might", "i think", "not sure", "quizas", "tal vez"];

/// Priority-ordered keyword classifier. Holds no state of its own; the
/// caller persists the result into the session context.
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(
        &self,
        text: &str,
        context: Option<&ConversationContext>,
        language: Option<&str>,
    ) -> IntentClassification {
        let normalized = text.trim().to_lowercase();
        let language = language.or_else(|| context.and_then(|context| context.language.as_deref()));

        let matchers: [(IntentCategory, &[&str], &[&str]); 6] = [
            (
                IntentCategory::Emergency,
                EMERGENCY_KEYWORDS,
                language_keywords(language, EMERGENCY_KEYWORDS_ES),
            ),
            (
                IntentCategory::ShelterSeeking,
                SHELTER_KEYWORDS,
                language_keywords(language, SHELTER_KEYWORDS_ES),
            ),
            (
                IntentCategory::LegalAid,
                LEGAL_KEYWORDS,
                language_keywords(language, LEGAL_KEYWORDS_ES),
            ),
            (
                IntentCategory::Counseling,
                COUNSELING_KEYWORDS,
                language_keywords(language, COUNSELING_KEYWORDS_ES),
            ),
            (
                IntentCategory::SafetyPlanning,
                SAFETY_PLANNING_KEYWORDS,
                language_keywords(language, SAFETY_PLANNING_KEYWORDS_ES),
            ),
            (
                IntentCategory::GeneralHelp,
                GENERAL_HELP_KEYWORDS,
                language_keywords(language, GENERAL_HELP_KEYWORDS_ES),
            ),
        ];

        for (category, base, extension) in matchers {
            if let Some(keyword) = first_match(&normalized, base, extension) {
                return self.build(category, &normalized, context, Some(keyword));
            }
        }

        if is_follow_up(&normalized, context) {
            return self.build(IntentCategory::FollowUp, &normalized, context, None);
        }

        if contains_any(&normalized, OFF_TOPIC_KEYWORDS) {
            return self.build(IntentCategory::OffTopic, &normalized, context, None);
        }

        IntentClassification {
            category: IntentCategory::Unknown,
            confidence: 0.2,
            reasoning_tags: vec!["no_matcher_fired".to_string()],
        }
    }

    fn build(
        &self,
        category: IntentCategory,
        normalized: &str,
        context: Option<&ConversationContext>,
        matched_keyword: Option<&str>,
    ) -> IntentClassification {
        let mut confidence = BASE_CONFIDENCE;
        let mut reasoning_tags = Vec::new();

        if let Some(keyword) = matched_keyword {
            reasoning_tags.push(format!("keyword:{keyword}"));
        }

        if normalized.split_whitespace().count() >= LONG_UTTERANCE_TOKENS {
            confidence += 0.1;
            reasoning_tags.push("long_utterance".to_string());
        }

        if matches!(
            category,
            IntentCategory::Emergency | IntentCategory::ShelterSeeking | IntentCategory::LegalAid
        ) {
            confidence += 0.2;
            reasoning_tags.push("specific_category".to_string());
        }

        if let Some(context) = context
            && context.last_intent == category
        {
            confidence += 0.1;
            reasoning_tags.push("context_continuity".to_string());
        }

        if category == IntentCategory::FollowUp
            && context.is_some_and(|context| context.last_intent != IntentCategory::Unknown)
        {
            reasoning_tags.push(format!(
                "follows:{}",
                context
                    .map(|context| context.last_intent.as_str())
                    .unwrap_or("unknown")
            ));
        }

        if contains_any(normalized, REQUEST_VERBS) {
            confidence += 0.1;
            reasoning_tags.push("request_verb".to_string());
        }

        if contains_any(normalized, HEDGING_WORDS) {
            confidence -= 0.15;
            reasoning_tags.push("hedging".to_string());
        }

        IntentClassification {
            category,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning_tags,
        }
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn is_follow_up(normalized: &str, context: Option<&ConversationContext>) -> bool {
    let Some(context) = context else {
        return false;
    };
    if context.last_intent == IntentCategory::Unknown {
        return false;
    }
    if normalized.is_empty() {
        return false;
    }

    contains_any(normalized, FOLLOW_UP_MARKERS)
        || normalized.split_whitespace().count() <= FOLLOW_UP_MAX_TOKENS
}

fn language_keywords(language: Option<&str>, spanish: &'static [&'static str]) -> &'static [&'static str] {
    match language {
        Some(language) if language.starts_with("es") => spanish,
        _ => &[],
    }
}

fn first_match<'a>(normalized: &str, base: &'a [&'a str], extension: &'a [&'a str]) -> Option<&'a str> {
    base.iter()
        .chain(extension.iter())
        .find(|keyword| normalized.contains(*keyword))
        .copied()
}

fn contains_any(normalized: &str, terms: &[&str]) -> bool {
    terms.iter().any(|term| normalized.contains(term))
}
