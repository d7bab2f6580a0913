//! Cross-cutting data types shared by several components.

use std::collections::HashMap;

/// Opaque tagged-union metadata bag, as used on [`crate::uap::VoiceSegment`],
/// [`Intent`], and registry records. Handlers that need typed fields should
/// decode specific keys rather than relying on the map's shape.
pub type Metadata = HashMap<String, serde_json::Value>;

/// A structured action request produced by an (external) ASR/NLU step and
/// consumed by the [`crate::resolver::ContextualEntityResolver`].
#[derive(Debug, Clone)]
pub struct Intent {
    /// Dotted `"domain.action"` name, e.g. `"device.control"`.
    pub name: String,
    /// Extracted entities, keyed by slot name.
    pub entities: Metadata,
    /// Recognizer confidence in `[0, 1]`.
    pub confidence: f32,
    /// The raw recognized text this intent was derived from.
    pub raw_text: String,
    /// Owning session id.
    pub session_id: String,
    /// Unix timestamp (seconds) the intent was produced.
    pub timestamp: f64,
}

impl Intent {
    /// Convenience constructor for an intent with no entities yet.
    pub fn new(
        name: impl Into<String>,
        raw_text: impl Into<String>,
        session_id: impl Into<String>,
        confidence: f32,
        timestamp: f64,
    ) -> Self {
        Self {
            name: name.into(),
            entities: Metadata::new(),
            confidence: confidence.clamp(0.0, 1.0),
            raw_text: raw_text.into(),
            session_id: session_id.into(),
            timestamp,
        }
    }

    /// The domain component of a dotted `"domain.action"` name.
    pub fn domain(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }
}

/// How an entity was resolved to a concrete referent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionType {
    /// Exact case-insensitive name match.
    Exact,
    /// Fuzzy token-ratio match above the acceptance threshold.
    Fuzzy,
    /// Resolved using context (current room, current session language, ...).
    Contextual,
    /// Resolved by inference (e.g. the single device of an inferred type).
    Inferred,
}

/// The outcome of resolving one entity's surface form to a referent.
#[derive(Debug, Clone)]
pub struct EntityResolution {
    /// The resolved value (a device id, a room name, a structured value...).
    pub resolved_value: serde_json::Value,
    /// The original surface-form value, unchanged.
    pub original_value: serde_json::Value,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// How the value was resolved.
    pub resolution_type: ResolutionType,
    /// Resolver-specific extra detail (e.g. `match_type`).
    pub metadata: Metadata,
}
