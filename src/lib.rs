//! vox-runtime: a real-time audio-to-intent runtime.
//!
//! Frames arrive from a microphone-side producer (outside this crate),
//! pass through voice activity detection and segmentation, and are
//! dispatched to wake-word/ASR providers to become [`types::Intent`]s.
//! From there, the contextual entity resolver, conversation context,
//! client registry, timer scheduler, and notification service provide
//! the supporting state a voice-assistant handler needs to act on an
//! intent and report back to the user.
//!
//! # Architecture
//!
//! - **`audio`**: frame type and validation shared by every stage.
//! - **`vad`**: per-frame voice/silence classification (simple and
//!   advanced variants).
//! - **`uap`**: the segmentation state machine that turns a frame stream
//!   into [`uap::VoiceSegment`]s, plus pre-ASR normalization.
//! - **`pipeline`**: dispatches segments to wake-word/ASR providers
//!   (wake-word-gated or direct), in arrival order.
//! - **`providers`**: the trait boundary to external ASR/TTS/wake-word/
//!   audio-output/persistence collaborators.
//! - **`metrics`**: unified, lock-sharded metrics collection and the
//!   weighted performance scorer.
//! - **`registry`**: per-client room/device inventory with TTL cleanup
//!   and optional persistence.
//! - **`context`**: per-session conversation state, action tracking, and
//!   bounded history.
//! - **`resolver`**: enriches recognized intents' entities using the
//!   registry and conversation context.
//! - **`scheduler`**: one-shot named timers with cancellation.
//! - **`notify`**: queued, multi-channel notification delivery.

pub mod audio;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod notify;
pub mod paths;
pub mod pipeline;
pub mod providers;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod types;
pub mod uap;
pub mod vad;

pub use config::RuntimeConfig;
pub use error::{Result, RuntimeError};
pub use pipeline::{AudioPipeline, AudioProcessingMethod, DispatchOutcome, PipelineMode};
pub use types::{EntityResolution, Intent, Metadata, ResolutionType};
