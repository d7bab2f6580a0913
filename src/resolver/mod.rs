//! Contextual entity resolver (C7): enriches an intent's entities using the
//! client registry (devices, rooms) and the session's conversation context.
//! Never raises — unresolved or partially-resolved entities simply omit
//! their `_resolved` fields.

mod classify;
mod device;
mod fuzzy;
mod location;
mod quantity;
mod temporal;

pub use classify::EntityCategory;
pub use fuzzy::token_ratio;

use crate::context::ConversationContext;
use crate::metrics::MetricsCollector;
use crate::registry::ClientRegistry;
use crate::types::{EntityResolution, Intent, Metadata, ResolutionType};
use std::time::Instant;
use tracing::debug;

/// Stateless facade over the per-category resolvers. Cheap to construct;
/// holds no mutable state of its own (confidence history lives in the
/// metrics collector).
#[derive(Debug, Default, Clone, Copy)]
pub struct ContextualEntityResolver;

impl ContextualEntityResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve every classifiable entity on `intent`, returning the
    /// additional fields to merge into the intent's entity map (never
    /// mutates `intent` itself). A sub-resolver failing or an entity not
    /// matching any category simply contributes no fields for that entity.
    pub async fn resolve(
        &self,
        intent: &Intent,
        context: &ConversationContext,
        registry: &ClientRegistry,
        metrics: &MetricsCollector,
    ) -> Metadata {
        let started = Instant::now();
        let mut additions = Metadata::new();
        let mut resolution_metadata = Metadata::new();

        let client = match &context.client_id {
            Some(id) => registry.get(id).await,
            None => None,
        };
        let devices = client.as_ref().map(|c| c.devices.clone()).unwrap_or_default();
        let current_room = client.as_ref().map(|c| c.room_name.clone()).unwrap_or_default();
        let known_rooms = registry.all_room_names().await;

        let mut attempted = 0usize;
        let mut resolved_count = 0usize;

        for (name, value) in &intent.entities {
            let text = value.as_str().map(str::to_owned).unwrap_or_else(|| value.to_string());
            let Some(category) = classify::classify(name, &text) else {
                continue;
            };
            attempted += 1;

            let resolution = match category {
                EntityCategory::Device => device::resolve_device(&text, &devices),
                EntityCategory::Location => location::resolve_location(&text, &current_room, &known_rooms),
                EntityCategory::Temporal => temporal::resolve_temporal(&text),
                EntityCategory::Quantity => quantity::resolve_quantity(&text),
            };

            match resolution {
                Some(resolution) => {
                    resolved_count += 1;
                    metrics.record_resolution_confidence(resolution.confidence);
                    apply_resolution(&mut additions, name, &resolution);
                    resolution_metadata.insert(
                        name.clone(),
                        serde_json::to_value(&resolution.metadata).unwrap_or(serde_json::Value::Null),
                    );
                }
                None => debug!(entity = name.as_str(), "entity did not resolve; leaving untouched"),
            }
        }

        if !resolution_metadata.is_empty() {
            additions.insert(
                "_resolution_metadata".into(),
                serde_json::to_value(&resolution_metadata).unwrap_or(serde_json::Value::Null),
            );
        }

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics.record_resolution(
            intent.domain(),
            &intent.name,
            attempted > 0 && resolved_count == attempted,
            latency_ms,
            false,
        );

        additions
    }
}

fn apply_resolution(additions: &mut Metadata, entity_name: &str, resolution: &EntityResolution) {
    additions.insert(format!("{entity_name}_resolved"), resolution.resolved_value.clone());
    additions.insert(format!("{entity_name}_confidence"), confidence_value(resolution.confidence));
    additions.insert(
        format!("{entity_name}_resolution_type"),
        resolution_type_label(resolution.resolution_type).into(),
    );
}

/// Round an `f32` confidence to 4 decimal places before widening to the
/// `f64` `serde_json::Value` uses, so e.g. `0.8f32` serializes as `0.8`
/// rather than the bit-exact widened value `0.800000011920929`.
fn confidence_value(confidence: f32) -> serde_json::Value {
    let rounded = (f64::from(confidence) * 10_000.0).round() / 10_000.0;
    serde_json::json!(rounded)
}

fn resolution_type_label(kind: ResolutionType) -> &'static str {
    match kind {
        ResolutionType::Exact => "exact",
        ResolutionType::Fuzzy => "fuzzy",
        ResolutionType::Contextual => "contextual",
        ResolutionType::Inferred => "inferred",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientRegistryConfig, MonitoringConfig};
    use crate::registry::{ClientRegistration, ClientType, Device};
    use std::collections::HashMap;

    async fn registry_with_kitchen() -> ClientRegistry {
        let registry = ClientRegistry::new(ClientRegistryConfig::default(), None);
        let now = chrono::Utc::now();
        registry
            .register(ClientRegistration {
                client_id: "kitchen".into(),
                room_name: "Кухня".into(),
                language: "ru".into(),
                client_type: ClientType::Esp32,
                devices: vec![
                    Device {
                        id: "d1".into(),
                        name: "Кухонный свет".into(),
                        device_type: "light".into(),
                        capabilities: HashMap::new(),
                        location: None,
                        metadata: Metadata::new(),
                    },
                    Device {
                        id: "d2".into(),
                        name: "Умная колонка".into(),
                        device_type: "speaker".into(),
                        capabilities: HashMap::new(),
                        location: None,
                        metadata: Metadata::new(),
                    },
                ],
                capabilities: HashMap::new(),
                registered_at: now,
                last_seen: now,
                source_address: None,
                user_agent: None,
                metadata: Metadata::new(),
            })
            .await
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn resolves_device_by_type_inference() {
        let registry = registry_with_kitchen().await;
        let metrics = MetricsCollector::new(&MonitoringConfig::default());
        let mut context = ConversationContext::new("s1");
        context.client_id = Some("kitchen".into());

        let mut intent = Intent::new("device.control", "включи свет", "s1", 0.9, 0.0);
        intent.entities.insert("device".into(), serde_json::json!("свет"));

        let resolver = ContextualEntityResolver::new();
        let additions = resolver.resolve(&intent, &context, &registry, &metrics).await;

        assert_eq!(additions["device_confidence"], serde_json::json!(0.8));
        assert_eq!(additions["device_resolution_type"], serde_json::json!("contextual"));
        assert!(additions["_resolution_metadata"]["device"]["match_type"] == serde_json::json!("type_single"));
    }

    #[tokio::test]
    async fn resolves_here_to_current_room() {
        let registry = registry_with_kitchen().await;
        let metrics = MetricsCollector::new(&MonitoringConfig::default());
        let mut context = ConversationContext::new("s1");
        context.client_id = Some("kitchen".into());

        let mut intent = Intent::new("device.status", "статус здесь", "s1", 0.9, 0.0);
        intent.entities.insert("location".into(), serde_json::json!("здесь"));

        let resolver = ContextualEntityResolver::new();
        let additions = resolver.resolve(&intent, &context, &registry, &metrics).await;

        assert_eq!(additions["location_resolved"], serde_json::json!("Кухня"));
    }

    #[tokio::test]
    async fn unclassifiable_entity_is_left_untouched() {
        let registry = registry_with_kitchen().await;
        let metrics = MetricsCollector::new(&MonitoringConfig::default());
        let context = ConversationContext::new("s1");

        let mut intent = Intent::new("misc.echo", "повтори", "s1", 0.9, 0.0);
        intent.entities.insert("unrelated".into(), serde_json::json!("xyzzy"));

        let resolver = ContextualEntityResolver::new();
        let additions = resolver.resolve(&intent, &context, &registry, &metrics).await;
        assert!(additions.is_empty());
    }
}
