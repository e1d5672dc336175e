use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ConfidencePolicy;
use crate::models::ConfidenceLevel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCorrection {
    pub rule_id: String,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionValidationResult {
    pub original: String,
    pub corrected: String,
    pub confidence_level: ConfidenceLevel,
    pub corrections: Vec<AppliedCorrection>,
    pub suspicious_pattern_detected: bool,
    pub is_valid: bool,
    pub should_reprompt: bool,
}

struct CorrectionRule {
    id: &'static str,
    pattern: Regex,
    replacement: &'static str,
}

/// Normalizes raw speech-to-text output through an ordered, immutable rule
/// table, then scans for artifact shapes the rules did not cover. Stateless:
/// the same input always yields the same result.
pub struct TranscriptionCorrector {
    rules: Vec<CorrectionRule>,
    suspicious_patterns: Vec<Regex>,
    policy: ConfidencePolicy,
}

impl TranscriptionCorrector {
    pub fn new(policy: ConfidencePolicy) -> Self {
        // Location-phrasing rules first, then general disfluencies. Every
        // replacement is chosen so that reapplying the table is a no-op.
        let rule_table: &[(&str, &str, &str)] = &[
            (
                "loc-dropped-im-at-region",
                r"\bI ([A-Z][a-z]+(?: [A-Z][a-z]+)*), ([A-Z]{2})\b",
                "I'm at $1, $2",
            ),
            (
                "loc-dropped-im-at-street",
                r"\bI ([A-Z][a-z]+(?: [A-Z][a-z]+)* (?:Street|Avenue|Road|Boulevard|Drive))\b",
                "I'm at $1",
            ),
            (
                "loc-stray-article",
                r"\b([Ii]n|[Aa]t|[Nn]ear) a ([A-Z][a-z]+)\b",
                "$1 $2",
            ),
            ("gen-help-find", r"(?i)\bhelp find\b", "help finding"),
            ("gen-i-needs", r"\bI needs\b", "I need"),
            ("gen-gonna", r"(?i)\bgonna\b", "going to"),
            ("gen-wanna", r"(?i)\bwanna\b", "want to"),
        ];

        let rules = rule_table
            .iter()
            .map(|(id, pattern, replacement)| CorrectionRule {
                id,
                pattern: Regex::new(pattern).expect("invalid correction rule pattern"),
                replacement,
            })
            .collect();

        let suspicious_patterns = [
            // Bare pronoun followed by a capitalized token and a digit.
            r"\b(?:I|[Mm]e|[Ww]e|[Hh]e|[Ss]he|[Tt]hey) [A-Z][a-z]+ \d",
            // Capitalized phrase followed by a location-type noun.
            r"\b[A-Z][a-z]+(?: [A-Z][a-z]+)* (?:[Ss]treet|[Aa]venue|[Rr]oad|[Ss]helter|[Cc]ounty|[Cc]ity)\b",
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("invalid suspicious pattern"))
        .collect();

        Self {
            rules,
            suspicious_patterns,
            policy,
        }
    }

    pub fn validate(&self, text: &str, confidence: Option<f64>) -> TranscriptionValidationResult {
        let original = text.to_string();
        if original.trim().is_empty() {
            return TranscriptionValidationResult {
                original,
                corrected: String::new(),
                confidence_level: classify_confidence(confidence, self.policy),
                corrections: Vec::new(),
                suspicious_pattern_detected: false,
                is_valid: false,
                should_reprompt: should_reprompt(confidence, self.policy),
            };
        }

        let mut corrected = original.clone();
        let mut corrections = Vec::new();

        for rule in &self.rules {
            let replaced = rule.pattern.replace_all(&corrected, rule.replacement);
            if replaced != corrected {
                let after = replaced.into_owned();
                corrections.push(AppliedCorrection {
                    rule_id: rule.id.to_string(),
                    before: corrected,
                    after: after.clone(),
                });
                corrected = after;
            }
        }

        let suspicious_pattern_detected = corrections.is_empty()
            && self
                .suspicious_patterns
                .iter()
                .any(|pattern| pattern.is_match(&corrected));

        TranscriptionValidationResult {
            original,
            corrected,
            confidence_level: classify_confidence(confidence, self.policy),
            corrections,
            suspicious_pattern_detected,
            is_valid: is_valid(confidence, self.policy),
            should_reprompt: should_reprompt(confidence, self.policy),
        }
    }
}

fn classify_confidence(confidence: Option<f64>, policy: ConfidencePolicy) -> ConfidenceLevel {
    let Some(confidence) = confidence else {
        return ConfidenceLevel::Unknown;
    };

    if confidence >= policy.high {
        ConfidenceLevel::High
    } else if confidence >= policy.medium {
        ConfidenceLevel::Medium
    } else if confidence >= policy.low {
        ConfidenceLevel::Low
    } else {
        ConfidenceLevel::VeryLow
    }
}

fn is_valid(confidence: Option<f64>, policy: ConfidencePolicy) -> bool {
    confidence.is_none_or(|confidence| confidence >= policy.low)
}

fn should_reprompt(confidence: Option<f64>, policy: ConfidencePolicy) -> bool {
    confidence.is_some_and(|confidence| confidence < policy.reprompt_below)
}
