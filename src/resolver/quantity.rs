//! Quantity entity resolver: digit+unit amounts and spelled-out word numbers.

use crate::types::{EntityResolution, Metadata, ResolutionType};
use std::sync::LazyLock;

static NUMBER_UNIT: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(процент\w*|градус\w*|штук\w*|percent|degrees?|items?)?")
        .expect("valid regex")
});

const WORD_NUMBERS: &[(&str, f64)] = &[
    ("ноль", 0.0),
    ("zero", 0.0),
    ("один", 1.0),
    ("одна", 1.0),
    ("one", 1.0),
    ("a", 1.0),
    ("an", 1.0),
    ("два", 2.0),
    ("две", 2.0),
    ("two", 2.0),
    ("три", 3.0),
    ("three", 3.0),
    ("четыре", 4.0),
    ("four", 4.0),
    ("пять", 5.0),
    ("five", 5.0),
    ("шесть", 6.0),
    ("six", 6.0),
    ("семь", 7.0),
    ("seven", 7.0),
    ("восемь", 8.0),
    ("eight", 8.0),
    ("девять", 9.0),
    ("nine", 9.0),
    ("десять", 10.0),
    ("ten", 10.0),
];

fn normalize_unit(raw: &str) -> &'static str {
    let lower = raw.to_lowercase();
    if lower.starts_with("процент") || lower.starts_with("percent") {
        "percent"
    } else if lower.starts_with("градус") || lower.starts_with("degree") {
        "degrees"
    } else {
        "items"
    }
}

pub fn resolve_quantity(value: &str) -> Option<EntityResolution> {
    if let Some(captures) = NUMBER_UNIT.captures(value) {
        if let Some(number_match) = captures.get(1) {
            let amount: f64 = number_match.as_str().replace(',', ".").parse().ok()?;
            let unit = captures.get(2).map_or("count", |m| normalize_unit(m.as_str()));
            let mut metadata = Metadata::new();
            metadata.insert("match_type".into(), "digit_unit".into());
            return Some(EntityResolution {
                resolved_value: serde_json::json!({ "value": amount, "unit": unit }),
                original_value: serde_json::Value::String(value.to_owned()),
                confidence: 0.85,
                resolution_type: ResolutionType::Exact,
                metadata,
            });
        }
    }

    let lower = value.to_lowercase();
    for token in lower.split_whitespace() {
        if let Some((_, amount)) = WORD_NUMBERS.iter().find(|(word, _)| *word == token) {
            let mut metadata = Metadata::new();
            metadata.insert("match_type".into(), "word_number".into());
            return Some(EntityResolution {
                resolved_value: serde_json::json!({ "value": amount, "unit": "count" }),
                original_value: serde_json::Value::String(value.to_owned()),
                confidence: 0.8,
                resolution_type: ResolutionType::Fuzzy,
                metadata,
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_with_unit_parses() {
        let resolution = resolve_quantity("50 процентов").unwrap();
        assert_eq!(resolution.resolved_value, serde_json::json!({ "value": 50.0, "unit": "percent" }));
        assert_eq!(resolution.confidence, 0.85);
    }

    #[test]
    fn bare_digit_defaults_to_count() {
        let resolution = resolve_quantity("7").unwrap();
        assert_eq!(resolution.resolved_value, serde_json::json!({ "value": 7.0, "unit": "count" }));
    }

    #[test]
    fn word_number_resolves() {
        let resolution = resolve_quantity("пять").unwrap();
        assert_eq!(resolution.resolved_value, serde_json::json!({ "value": 5.0, "unit": "count" }));
        assert_eq!(resolution.confidence, 0.8);
    }

    #[test]
    fn unparseable_returns_none() {
        assert!(resolve_quantity("свет").is_none());
    }
}
