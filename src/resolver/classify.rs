//! Heuristic RU/EN keyword classifiers deciding which resolver an entity
//! belongs to, from its slot name and surface-form value.

use std::sync::LazyLock;

/// Entity category, decided from name/value substrings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityCategory {
    Device,
    Location,
    Temporal,
    Quantity,
}

const DEVICE_KEYWORDS: &[&str] = &[
    "свет", "лампа", "лампочка", "колонка", "датчик", "камера", "розетка", "термостат",
    "light", "lamp", "speaker", "sensor", "camera", "outlet", "thermostat", "tv", "телевизор",
];

const LOCATION_KEYWORDS: &[&str] = &[
    "комната", "здесь", "тут", "дом", "кухня", "спальня", "гостиная", "в ", "room", "here",
    "at", "home", "kitchen", "bedroom", "living room",
];

const TEMPORAL_KEYWORDS: &[&str] = &[
    "время", "минут", "секунд", "час", "время", "сейчас", "завтра", "вчера", "time", "minutes",
    "seconds", "hours", "hour", "now", "tomorrow", "yesterday",
];

const QUANTITY_KEYWORDS: &[&str] = &[
    "число", "штук", "процент", "градус", "количество", "number", "items", "percent", "degree",
    "degrees", "count",
];

static HHMM_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^\s*([01]?\d|2[0-3]):([0-5]\d)\s*$").expect("valid regex"));

static DIGIT_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\d").expect("valid regex"));

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    needles.iter().any(|needle| lower.contains(needle))
}

/// Classify an entity by its slot `name` and surface-form `value`. Name
/// takes priority; value is consulted when the name alone is inconclusive.
/// Returns `None` when no category's keywords match either field.
pub fn classify(name: &str, value: &str) -> Option<EntityCategory> {
    if HHMM_PATTERN.is_match(value) {
        return Some(EntityCategory::Temporal);
    }

    if contains_any(name, DEVICE_KEYWORDS) || contains_any(value, DEVICE_KEYWORDS) {
        return Some(EntityCategory::Device);
    }
    if contains_any(name, LOCATION_KEYWORDS) || contains_any(value, LOCATION_KEYWORDS) {
        return Some(EntityCategory::Location);
    }
    if contains_any(name, TEMPORAL_KEYWORDS) || contains_any(value, TEMPORAL_KEYWORDS) {
        return Some(EntityCategory::Temporal);
    }
    if contains_any(name, QUANTITY_KEYWORDS) || contains_any(value, QUANTITY_KEYWORDS) {
        return Some(EntityCategory::Quantity);
    }
    if DIGIT_PATTERN.is_match(value) {
        return Some(EntityCategory::Quantity);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_ru_device_keyword() {
        assert_eq!(classify("device", "свет"), Some(EntityCategory::Device));
    }

    #[test]
    fn classifies_en_location_keyword() {
        assert_eq!(classify("target", "here"), Some(EntityCategory::Location));
    }

    #[test]
    fn classifies_hhmm_as_temporal() {
        assert_eq!(classify("at", "14:30"), Some(EntityCategory::Temporal));
    }

    #[test]
    fn classifies_bare_digits_as_quantity() {
        assert_eq!(classify("value", "42"), Some(EntityCategory::Quantity));
    }

    #[test]
    fn unclassifiable_returns_none() {
        assert_eq!(classify("foo", "bar"), None);
    }
}
