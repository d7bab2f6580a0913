//! Interfaces the core consumes from its external collaborators: ASR,
//! wake-word detection, TTS, and audio output. Implementations live outside
//! this crate; the dispatcher only ever talks to these traits.

use crate::error::Result;
use crate::uap::VoiceSegment;
use async_trait::async_trait;
use std::collections::HashMap;

/// What a provider declares about itself once, at registration. The
/// dispatcher consults this instead of probing for methods at call time.
#[derive(Debug, Clone, Default)]
pub struct ProviderCapabilities {
    /// BCP-47-ish language tags the provider understands (empty = any).
    pub languages: Vec<String>,
    /// Audio formats accepted, e.g. `"pcm_s16le"`.
    pub formats: Vec<String>,
    /// Whether the provider can emit partial/streaming results.
    pub streaming: bool,
    /// Whether concurrent calls into this provider are safe. The dispatcher
    /// only parallelizes segment handling when this is `true`.
    pub thread_safe: bool,
}

/// Outcome of an ASR call.
#[derive(Debug, Clone)]
pub struct TranscriptionResult {
    pub text: String,
    pub confidence: f32,
    pub duration_ms: f64,
    pub error: Option<String>,
}

impl TranscriptionResult {
    /// `true` when the provider returned no usable text — the dispatcher's
    /// trigger to try the fallback-to-original policy.
    pub fn is_empty_result(&self) -> bool {
        self.error.is_none() && self.text.trim().is_empty()
    }
}

/// Outcome of a wake-word detection call.
#[derive(Debug, Clone)]
pub struct WakeWordResult {
    pub detected: bool,
    pub confidence: f32,
    pub wake_word: Option<String>,
}

/// Speech-to-text collaborator.
#[async_trait]
pub trait AsrProvider: Send + Sync {
    /// Transcribe a completed voice segment.
    async fn transcribe(&self, segment: &VoiceSegment, language: Option<&str>) -> Result<TranscriptionResult>;

    /// Reset any internal streaming/decoder state. Must be idempotent.
    async fn reset_state(&self) -> Result<()>;

    /// Capabilities declared once at registration.
    fn capabilities(&self) -> &ProviderCapabilities;
}

/// Wake-word spotting collaborator.
#[async_trait]
pub trait WakeWordProvider: Send + Sync {
    /// Decide whether a segment contains the configured wake word.
    async fn detect(&self, segment: &VoiceSegment) -> Result<WakeWordResult>;

    fn capabilities(&self) -> &ProviderCapabilities;
}

/// Text-to-speech collaborator.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// Synthesize `text` to a file at `path`.
    async fn synth_to_file(
        &self,
        text: &str,
        path: &str,
        voice: Option<&str>,
        lang: Option<&str>,
        speed: Option<f32>,
    ) -> Result<()>;

    /// Synthesize and play `text` immediately.
    async fn speak(
        &self,
        text: &str,
        voice: Option<&str>,
        lang: Option<&str>,
        speed: Option<f32>,
    ) -> Result<()>;

    fn capabilities(&self) -> &ProviderCapabilities;
}

/// Audio playback collaborator (speaker-side output, as opposed to
/// the microphone-side `AudioFrame` producers described in [`crate::audio`]).
#[async_trait]
pub trait AudioOutput: Send + Sync {
    async fn play_file(&self, path: &str, device: Option<&str>, volume: Option<f32>) -> Result<()>;
    async fn play_stream(
        &self,
        bytes: Vec<u8>,
        format: &str,
        sample_rate: Option<u32>,
        channels: Option<u16>,
    ) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn pause(&self) -> Result<()>;
    async fn resume(&self) -> Result<()>;
    async fn list_devices(&self) -> Result<Vec<String>>;
    async fn set_device(&self, id: &str) -> Result<()>;
    async fn set_volume(&self, volume: f32) -> Result<()>;
}

/// Persistence collaborator for the client registry (§6). Implementations
/// may back this with a file, a database, or nothing at all.
#[async_trait]
pub trait RegistryPersistence: Send + Sync {
    async fn save(&self, registrations: &HashMap<String, crate::registry::ClientRegistration>) -> Result<()>;
    async fn load(&self) -> Result<HashMap<String, crate::registry::ClientRegistration>>;
}
