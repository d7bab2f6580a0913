//! Device entity resolver: exact name, then fuzzy name, then type inference.

use super::fuzzy::token_ratio;
use crate::registry::Device;
use crate::types::{EntityResolution, Metadata, ResolutionType};

/// Minimum [`token_ratio`] score accepted as a fuzzy name match.
const FUZZY_ACCEPT_THRESHOLD: u8 = 70;

const TYPE_KEYWORDS: &[(&str, &str)] = &[
    ("свет", "light"),
    ("лампа", "light"),
    ("лампочка", "light"),
    ("light", "light"),
    ("lamp", "light"),
    ("колонка", "speaker"),
    ("speaker", "speaker"),
    ("датчик", "sensor"),
    ("sensor", "sensor"),
    ("камера", "camera"),
    ("camera", "camera"),
    ("розетка", "outlet"),
    ("outlet", "outlet"),
    ("термостат", "thermostat"),
    ("thermostat", "thermostat"),
    ("телевизор", "tv"),
    ("tv", "tv"),
];

fn infer_type(value: &str) -> Option<&'static str> {
    let lower = value.to_lowercase();
    TYPE_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, device_type)| *device_type)
}

/// Resolve a device surface form against one client's device inventory.
pub fn resolve_device(value: &str, devices: &[Device]) -> Option<EntityResolution> {
    let needle = value.to_lowercase();

    if let Some(device) = devices.iter().find(|d| d.name.to_lowercase() == needle) {
        return Some(exact_match(device));
    }

    let mut best: Option<(&Device, u8)> = None;
    for device in devices {
        let score = token_ratio(&device.name, value);
        if score >= FUZZY_ACCEPT_THRESHOLD && best.as_ref().is_none_or(|(_, best_score)| score > *best_score) {
            best = Some((device, score));
        }
    }
    if let Some((device, score)) = best {
        return Some(fuzzy_match(device, score));
    }

    let inferred_type = infer_type(value)?;
    let candidates: Vec<&Device> = devices.iter().filter(|d| d.device_type == inferred_type).collect();
    match candidates.as_slice() {
        [] => None,
        [single] => Some(type_single_match(single)),
        many => Some(type_multiple_match(many)),
    }
}

fn device_json(device: &Device) -> serde_json::Value {
    serde_json::json!({ "id": device.id, "name": device.name, "type": device.device_type })
}

fn exact_match(device: &Device) -> EntityResolution {
    let mut metadata = Metadata::new();
    metadata.insert("match_type".into(), "exact".into());
    EntityResolution {
        resolved_value: device_json(device),
        original_value: serde_json::Value::String(device.name.clone()),
        confidence: 1.0,
        resolution_type: ResolutionType::Exact,
        metadata,
    }
}

fn fuzzy_match(device: &Device, score: u8) -> EntityResolution {
    let mut metadata = Metadata::new();
    metadata.insert("match_type".into(), "fuzzy".into());
    metadata.insert("fuzzy_score".into(), score.into());
    EntityResolution {
        resolved_value: device_json(device),
        original_value: serde_json::Value::String(device.name.clone()),
        confidence: f32::from(score) / 100.0,
        resolution_type: ResolutionType::Fuzzy,
        metadata,
    }
}

fn type_single_match(device: &Device) -> EntityResolution {
    let mut metadata = Metadata::new();
    metadata.insert("match_type".into(), "type_single".into());
    EntityResolution {
        resolved_value: device_json(device),
        original_value: serde_json::Value::String(device.name.clone()),
        confidence: 0.8,
        resolution_type: ResolutionType::Contextual,
        metadata,
    }
}

fn type_multiple_match(devices: &[&Device]) -> EntityResolution {
    let mut metadata = Metadata::new();
    metadata.insert("match_type".into(), "type_multiple".into());
    EntityResolution {
        resolved_value: serde_json::Value::Array(devices.iter().map(|d| device_json(d)).collect()),
        original_value: serde_json::Value::Null,
        confidence: 0.6,
        resolution_type: ResolutionType::Contextual,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn device(id: &str, name: &str, device_type: &str) -> Device {
        Device {
            id: id.into(),
            name: name.into(),
            device_type: device_type.into(),
            capabilities: HashMap::new(),
            location: None,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn exact_name_wins() {
        let devices = vec![device("d1", "Кухонный свет", "light")];
        let resolution = resolve_device("Кухонный свет", &devices).unwrap();
        assert_eq!(resolution.resolution_type, ResolutionType::Exact);
        assert_eq!(resolution.confidence, 1.0);
    }

    #[test]
    fn fuzzy_name_above_threshold() {
        let devices = vec![device("d1", "Кухонный свет", "light")];
        let resolution = resolve_device("кухонный свет выключи", &devices).unwrap();
        assert_eq!(resolution.resolution_type, ResolutionType::Fuzzy);
    }

    #[test]
    fn single_device_of_inferred_type() {
        let devices = vec![device("d1", "Потолочный светильник", "light"), device("d2", "Умная колонка", "speaker")];
        let resolution = resolve_device("свет", &devices).unwrap();
        assert_eq!(resolution.confidence, 0.8);
        assert_eq!(resolution.resolution_type, ResolutionType::Contextual);
    }

    #[test]
    fn multiple_devices_of_inferred_type() {
        let devices = vec![device("d1", "Потолочный светильник", "light"), device("d2", "Настольная лампа", "light")];
        let resolution = resolve_device("свет", &devices).unwrap();
        assert_eq!(resolution.confidence, 0.6);
        assert_eq!(resolution.resolution_type, ResolutionType::Contextual);
        assert!(resolution.resolved_value.is_array());
    }

    #[test]
    fn no_match_returns_none() {
        let devices = vec![device("d1", "Кухонный свет", "light")];
        assert!(resolve_device("термостат", &devices).is_none());
    }
}
