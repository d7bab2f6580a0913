//! Temporal entity resolver: clock time, durations, and relative keywords.

use crate::types::{EntityResolution, Metadata, ResolutionType};
use std::sync::LazyLock;

static HHMM: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^\s*([01]?\d|2[0-3]):([0-5]\d)\s*$").expect("valid regex"));

static DURATION: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?i)(\d+)\s*(секунд\w*|минут\w*|час\w*|seconds?|minutes?|mins?|hours?|hrs?)",
    )
    .expect("valid regex")
});

const RELATIVE_KEYWORDS: &[(&str, i64)] = &[
    ("сейчас", 0),
    ("now", 0),
    ("завтра", 1),
    ("tomorrow", 1),
    ("вчера", -1),
    ("yesterday", -1),
];

fn normalize_unit(raw: &str) -> &'static str {
    let lower = raw.to_lowercase();
    if lower.starts_with("сек") || lower.starts_with("sec") {
        "seconds"
    } else if lower.starts_with("мин") || lower.starts_with("min") {
        "minutes"
    } else {
        "hours"
    }
}

pub fn resolve_temporal(value: &str) -> Option<EntityResolution> {
    if let Some(captures) = HHMM.captures(value) {
        let hours: u32 = captures[1].parse().ok()?;
        let minutes: u32 = captures[2].parse().ok()?;
        let mut metadata = Metadata::new();
        metadata.insert("match_type".into(), "clock_time".into());
        return Some(EntityResolution {
            resolved_value: serde_json::json!({ "hours": hours, "minutes": minutes }),
            original_value: serde_json::Value::String(value.to_owned()),
            confidence: 0.95,
            resolution_type: ResolutionType::Exact,
            metadata,
        });
    }

    if let Some(captures) = DURATION.captures(value) {
        let amount: f64 = captures[1].parse().ok()?;
        let unit = normalize_unit(&captures[2]);
        let mut metadata = Metadata::new();
        metadata.insert("match_type".into(), "duration".into());
        return Some(EntityResolution {
            resolved_value: serde_json::json!({ "value": amount, "unit": unit }),
            original_value: serde_json::Value::String(value.to_owned()),
            confidence: 0.9,
            resolution_type: ResolutionType::Fuzzy,
            metadata,
        });
    }

    let lower = value.to_lowercase();
    if let Some((_, offset)) = RELATIVE_KEYWORDS.iter().find(|(kw, _)| lower.contains(kw)) {
        let mut metadata = Metadata::new();
        metadata.insert("match_type".into(), "relative".into());
        return Some(EntityResolution {
            resolved_value: serde_json::json!({ "relative": lower, "offset": offset }),
            original_value: serde_json::Value::String(value.to_owned()),
            confidence: 0.8,
            resolution_type: ResolutionType::Contextual,
            metadata,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_time_parses_hh_mm() {
        let resolution = resolve_temporal("14:30").unwrap();
        assert_eq!(resolution.resolved_value, serde_json::json!({ "hours": 14, "minutes": 30 }));
        assert_eq!(resolution.confidence, 0.95);
    }

    #[test]
    fn duration_parses_ru_unit() {
        let resolution = resolve_temporal("5 минут").unwrap();
        assert_eq!(resolution.resolved_value, serde_json::json!({ "value": 5.0, "unit": "minutes" }));
    }

    #[test]
    fn duration_parses_en_unit() {
        let resolution = resolve_temporal("10 seconds").unwrap();
        assert_eq!(resolution.resolved_value, serde_json::json!({ "value": 10.0, "unit": "seconds" }));
    }

    #[test]
    fn relative_keyword_resolves_with_offset() {
        let resolution = resolve_temporal("завтра").unwrap();
        assert_eq!(resolution.confidence, 0.8);
    }

    #[test]
    fn unparseable_returns_none() {
        assert!(resolve_temporal("свет").is_none());
    }
}
