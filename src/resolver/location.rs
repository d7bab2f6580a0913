//! Location entity resolver: "here" against the session's current room,
//! otherwise exact/fuzzy match against known room names.

use super::fuzzy::token_ratio;
use crate::types::{EntityResolution, Metadata, ResolutionType};

const HERE_KEYWORDS: &[&str] = &["here", "здесь", "тут"];
const FUZZY_ACCEPT_THRESHOLD: u8 = 75;

/// Resolve a location surface form. `current_room` is the session's client
/// room (may be empty if unknown); `known_rooms` is every room name seen in
/// the client registry.
pub fn resolve_location(value: &str, current_room: &str, known_rooms: &[String]) -> Option<EntityResolution> {
    let lower = value.to_lowercase();

    if HERE_KEYWORDS.iter().any(|kw| lower == *kw) && !current_room.is_empty() {
        let mut metadata = Metadata::new();
        metadata.insert("match_type".into(), "here".into());
        return Some(EntityResolution {
            resolved_value: serde_json::Value::String(current_room.to_owned()),
            original_value: serde_json::Value::String(value.to_owned()),
            confidence: 0.9,
            resolution_type: ResolutionType::Contextual,
            metadata,
        });
    }

    if let Some(room) = known_rooms.iter().find(|room| room.to_lowercase() == lower) {
        let mut metadata = Metadata::new();
        metadata.insert("match_type".into(), "exact".into());
        return Some(EntityResolution {
            resolved_value: serde_json::Value::String(room.clone()),
            original_value: serde_json::Value::String(value.to_owned()),
            confidence: 1.0,
            resolution_type: ResolutionType::Exact,
            metadata,
        });
    }

    let mut best: Option<(&String, u8)> = None;
    for room in known_rooms {
        let score = token_ratio(room, value);
        if score >= FUZZY_ACCEPT_THRESHOLD && best.as_ref().is_none_or(|(_, best_score)| score > *best_score) {
            best = Some((room, score));
        }
    }
    best.map(|(room, score)| {
        let mut metadata = Metadata::new();
        metadata.insert("match_type".into(), "fuzzy".into());
        metadata.insert("fuzzy_score".into(), score.into());
        EntityResolution {
            resolved_value: serde_json::Value::String(room.clone()),
            original_value: serde_json::Value::String(value.to_owned()),
            confidence: f32::from(score) / 100.0,
            resolution_type: ResolutionType::Fuzzy,
            metadata,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn here_resolves_to_current_room() {
        let resolution = resolve_location("здесь", "Кухня", &[]).unwrap();
        assert_eq!(resolution.resolved_value, serde_json::json!("Кухня"));
        assert!(resolution.confidence >= 0.9);
    }

    #[test]
    fn exact_room_match() {
        let rooms = vec!["Кухня".to_string(), "Спальня".to_string()];
        let resolution = resolve_location("кухня", "", &rooms).unwrap();
        assert_eq!(resolution.confidence, 1.0);
    }

    #[test]
    fn no_match_without_rooms() {
        assert!(resolve_location("гараж", "", &[]).is_none());
    }
}
