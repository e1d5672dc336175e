use serde::{Deserialize, Serialize};

pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKey {
    AskLocation,
    AskLocationRetry,
    RepeatRequest,
}

impl PromptKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AskLocation => "ask_location",
            Self::AskLocationRetry => "ask_location_retry",
            Self::RepeatRequest => "repeat_request",
        }
    }
}

/// Resolves human-readable prompt text for a language code, falling back to
/// the primary subtag and then to English. Rendering beyond `{name}`-style
/// parameter substitution is out of scope.
pub trait LocalizationProvider: Send + Sync {
    fn prompt(&self, language: &str, key: PromptKey, params: &[(&str, &str)]) -> String;
}

pub struct StaticLocalizer;

impl StaticLocalizer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StaticLocalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalizationProvider for StaticLocalizer {
    fn prompt(&self, language: &str, key: PromptKey, params: &[(&str, &str)]) -> String {
        let template = lookup(language, key)
            .or_else(|| lookup(primary_subtag(language), key))
            .unwrap_or_else(|| {
                lookup(DEFAULT_LANGUAGE, key).unwrap_or("Could you repeat that, please?")
            });

        substitute(template, params)
    }
}

fn lookup(language: &str, key: PromptKey) -> Option<&'static str> {
    match (language, key) {
        ("en", PromptKey::AskLocation) => {
            Some("What city and state are you in? You can also tell me the country.")
        }
        ("en", PromptKey::AskLocationRetry) => Some(
            "I couldn't find that place. Could you tell me the city and state again, slowly?",
        ),
        ("en", PromptKey::RepeatRequest) => {
            Some("I'm sorry, I didn't catch that. Could you say it again?")
        }
        ("es", PromptKey::AskLocation) => {
            Some("¿En qué ciudad y estado se encuentra? También puede decirme el país.")
        }
        ("es", PromptKey::AskLocationRetry) => Some(
            "No pude encontrar ese lugar. ¿Podría repetirme la ciudad y el estado, despacio?",
        ),
        ("es", PromptKey::RepeatRequest) => {
            Some("Lo siento, no le entendí. ¿Podría repetirlo?")
        }
        _ => None,
    }
}

fn primary_subtag(language: &str) -> &str {
    language
        .split(['-', '_'])
        .next()
        .unwrap_or(DEFAULT_LANGUAGE)
}

fn substitute(template: &str, params: &[(&str, &str)]) -> String {
    let mut rendered = template.to_string();
    for (name, value) in params {
        rendered = rendered.replace(&format!("{{{name}}}"), value);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_from_regional_code_to_primary_subtag() {
        let localizer = StaticLocalizer::new();

        let regional = localizer.prompt("es-MX", PromptKey::AskLocation, &[]);
        let primary = localizer.prompt("es", PromptKey::AskLocation, &[]);
        assert_eq!(regional, primary);
    }

    #[test]
    fn unknown_language_falls_back_to_english() {
        let localizer = StaticLocalizer::new();

        let unknown = localizer.prompt("fr", PromptKey::RepeatRequest, &[]);
        let english = localizer.prompt("en", PromptKey::RepeatRequest, &[]);
        assert_eq!(unknown, english);
    }

    #[test]
    fn substitutes_named_params() {
        let rendered = substitute("Looking near {city}.", &[("city", "Austin")]);
        assert_eq!(rendered, "Looking near Austin.");
    }
}
