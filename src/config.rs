//! Configuration types for the audio-to-intent runtime.
//!
//! These structs enumerate the recognized options from the configuration
//! surface; parsing them out of a file format (TOML/JSON/env) is an
//! external concern — callers construct a [`RuntimeConfig`] however they
//! like (a CLI, a file loader, a test fixture) and hand it to the runtime.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Voice activity detection settings.
    pub vad: VadConfig,
    /// Universal Audio Processor (segmentation) settings.
    pub uap: UapConfig,
    /// Metrics collector settings.
    pub monitoring: MonitoringConfig,
    /// Client registry settings.
    pub client_registry: ClientRegistryConfig,
    /// Audio pipeline (wake-word/ASR dispatch) settings.
    pub pipeline: PipelineConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            vad: VadConfig::default(),
            uap: UapConfig::default(),
            monitoring: MonitoringConfig::default(),
            client_registry: ClientRegistryConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Voice activity detection configuration (`vad.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Master switch for VAD. The rest of this spec assumes `true`.
    pub enabled: bool,
    /// Base RMS energy threshold in `(0, 1]`.
    pub energy_threshold: f32,
    /// Divisor applied to the adaptive threshold, in `[0.1, 3.0]`.
    pub sensitivity: f32,
    /// Consecutive voice frames required to enter the voice state.
    pub voice_frames_required: u32,
    /// Consecutive silence frames required to leave the voice state.
    pub silence_frames_required: u32,
    /// Enable the Advanced variant (ZCR gating + multi-frame smoothing).
    pub use_zero_crossing_rate: bool,
    /// Enable adaptive noise-floor tracking.
    pub adaptive_threshold: bool,
    /// Percentile used for the noise floor, in `[1, 50]`.
    pub noise_percentile: f32,
    /// Multiplier applied to the noise floor, in `[1, 10]`.
    pub voice_multiplier: f32,
    /// Per-frame processing latency budget in milliseconds.
    pub processing_timeout_ms: f64,
    /// Enable pre-ASR normalization.
    pub normalize_for_asr: bool,
    /// Normalization target RMS, in `[0.05, 0.3]`.
    pub asr_target_rms: f32,
    /// Retry with the original segment if normalized ASR returns empty.
    pub enable_fallback_to_original: bool,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            energy_threshold: 0.02,
            sensitivity: 1.0,
            voice_frames_required: 2,
            silence_frames_required: 5,
            use_zero_crossing_rate: true,
            adaptive_threshold: true,
            noise_percentile: 15.0,
            voice_multiplier: 3.0,
            processing_timeout_ms: 23.0,
            normalize_for_asr: true,
            asr_target_rms: 0.15,
            enable_fallback_to_original: true,
        }
    }
}

/// Universal Audio Processor configuration (segment accumulation).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UapConfig {
    /// Number of frames kept in the pre-buffer (default ~100ms at 25ms/frame).
    pub pre_buffer_frames: usize,
    /// Maximum frames retained in the voice-buffer before a forced overflow emission.
    pub buffer_size_frames: usize,
    /// Maximum segment duration in seconds before a forced timeout emission.
    pub max_segment_duration_s: f64,
}

impl Default for UapConfig {
    fn default() -> Self {
        Self {
            pre_buffer_frames: 4,
            buffer_size_frames: 1000,
            max_segment_duration_s: 10.0,
        }
    }
}

/// Metrics collector configuration (`monitoring.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Enable the metrics collector. When false, recording calls are no-ops.
    pub metrics_enabled: bool,
    /// History retention window, in hours.
    pub metrics_retention_hours: u32,
    /// Memory/metrics sweeper period, in seconds.
    pub memory_cleanup_interval_s: u64,
    /// Latency threshold (ms) above which a `threshold_violations` counter increments.
    pub latency_threshold_ms: f64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            metrics_retention_hours: 24,
            memory_cleanup_interval_s: 300,
            latency_threshold_ms: 50.0,
        }
    }
}

/// Audio pipeline dispatch configuration (`pipeline.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// `true` gates ASR dispatch behind wake-word detection (Mode A);
    /// `false` sends every segment straight to ASR (Mode B).
    pub wake_word_gated: bool,
    /// Maximum time a single provider call (ASR or wake-word) may take
    /// before it is treated as a provider-timeout failure.
    pub provider_call_timeout_ms: u64,
    /// How long a session stays "awake" after wake-word detection without
    /// a successful ASR dispatch before reverting to wake-word gating.
    pub awake_idle_timeout_s: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            wake_word_gated: true,
            provider_call_timeout_ms: 5_000,
            awake_idle_timeout_s: 15,
        }
    }
}

/// Client registry configuration (`client_registry.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientRegistryConfig {
    /// Idle timeout (seconds) after which a registration is considered expired.
    pub registration_timeout_s: u64,
    /// Enable persistence of registrations to a backing store.
    pub persistent_storage: bool,
}

impl Default for ClientRegistryConfig {
    fn default() -> Self {
        Self {
            registration_timeout_s: 3600,
            persistent_storage: false,
        }
    }
}
