//! Audio pipeline interface (C3): dispatches completed voice segments to
//! the wake-word and ASR providers, one session at a time, in arrival
//! order. This is the only place that decides *whether* a segment reaches
//! ASR at all (Mode A) and *how* it gets there (normalize-then-fallback).

use crate::config::PipelineConfig;
use crate::metrics::MetricsCollector;
use crate::providers::{AsrProvider, TranscriptionResult, WakeWordProvider};
use crate::uap::{VoiceSegment, normalize_for_asr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Which gate a segment must pass before reaching ASR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// Segments are withheld from ASR until the wake word is detected.
    WakeWordGated,
    /// Every segment goes straight to ASR.
    DirectAsr,
}

/// Which audio actually reached the ASR provider for a given dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioProcessingMethod {
    /// RMS-normalized audio produced a usable transcription.
    Normalized,
    /// Normalized audio was empty; the original segment was retried and
    /// produced the returned transcription.
    FallbackOriginal,
    /// Normalization is disabled; the original segment was used directly.
    Original,
}

/// One session's wake-word gate. `Idle` means the next segment is checked
/// for the wake word rather than forwarded to ASR.
#[derive(Debug, Clone, Copy)]
enum WakeState {
    Idle,
    Awake { since: Instant },
}

/// Outcome of dispatching one segment. Never an exception: provider
/// failures surface as [`DispatchOutcome::Error`] carrying the segment
/// back to the caller.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Consumed by the wake-word gate (Mode A, session was not yet awake).
    WakeWord {
        detected: bool,
        confidence: f32,
        wake_word: Option<String>,
    },
    /// Forwarded to ASR and transcribed (possibly empty).
    Transcribed {
        result: TranscriptionResult,
        audio_processing_method: AudioProcessingMethod,
    },
    /// A provider call failed or timed out.
    Error { error: String, segment: VoiceSegment },
}

/// Per-session dispatcher. Not `Send`-shared across sessions: construct
/// one per audio source, alongside its [`crate::uap::UniversalAudioProcessor`].
pub struct AudioPipeline {
    mode: PipelineMode,
    asr: Arc<dyn AsrProvider>,
    wake_word: Option<Arc<dyn WakeWordProvider>>,
    normalize_for_asr: bool,
    asr_target_rms: f32,
    enable_fallback_to_original: bool,
    provider_call_timeout: Duration,
    awake_idle_timeout: Duration,
    metrics: Arc<MetricsCollector>,
    wake_state: WakeState,
}

impl AudioPipeline {
    pub fn new(
        config: &PipelineConfig,
        vad: &crate::config::VadConfig,
        asr: Arc<dyn AsrProvider>,
        wake_word: Option<Arc<dyn WakeWordProvider>>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let mode = if config.wake_word_gated && wake_word.is_some() {
            PipelineMode::WakeWordGated
        } else {
            PipelineMode::DirectAsr
        };
        Self {
            mode,
            asr,
            wake_word,
            normalize_for_asr: vad.normalize_for_asr,
            asr_target_rms: vad.asr_target_rms,
            enable_fallback_to_original: vad.enable_fallback_to_original,
            provider_call_timeout: Duration::from_millis(config.provider_call_timeout_ms),
            awake_idle_timeout: Duration::from_secs(config.awake_idle_timeout_s),
            metrics,
            wake_state: WakeState::Idle,
        }
    }

    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    /// Dispatch one segment. Segments must be fed in arrival order; this
    /// method does not reorder or buffer across calls.
    pub async fn dispatch(&mut self, segment: VoiceSegment, language: Option<&str>) -> DispatchOutcome {
        self.expire_awake_state();

        match self.mode {
            PipelineMode::DirectAsr => self.dispatch_asr(segment, language).await,
            PipelineMode::WakeWordGated => {
                if matches!(self.wake_state, WakeState::Awake { .. }) {
                    let outcome = self.dispatch_asr(segment, language).await;
                    if matches!(outcome, DispatchOutcome::Transcribed { .. }) {
                        // One successful ASR dispatch returns the session to idle.
                        self.wake_state = WakeState::Idle;
                    }
                    outcome
                } else {
                    self.dispatch_wake_word(segment).await
                }
            }
        }
    }

    fn expire_awake_state(&mut self) {
        if let WakeState::Awake { since } = self.wake_state {
            if since.elapsed() > self.awake_idle_timeout {
                self.wake_state = WakeState::Idle;
            }
        }
    }

    async fn dispatch_wake_word(&mut self, segment: VoiceSegment) -> DispatchOutcome {
        let Some(provider) = self.wake_word.clone() else {
            return DispatchOutcome::Error {
                error: "pipeline is wake-word gated but no wake-word provider is configured".into(),
                segment,
            };
        };

        match tokio::time::timeout(self.provider_call_timeout, provider.detect(&segment)).await {
            Ok(Ok(result)) => {
                if result.detected {
                    self.wake_state = WakeState::Awake { since: Instant::now() };
                }
                DispatchOutcome::WakeWord {
                    detected: result.detected,
                    confidence: result.confidence,
                    wake_word: result.wake_word,
                }
            }
            Ok(Err(err)) => {
                warn!("wake-word provider error: {err}");
                DispatchOutcome::Error { error: err.to_string(), segment }
            }
            Err(_) => {
                self.metrics.record_component_metric("pipeline", "provider_timeout", 1.0);
                warn!("wake-word provider call exceeded its {:?} deadline", self.provider_call_timeout);
                DispatchOutcome::Error { error: "wake-word provider call timed out".into(), segment }
            }
        }
    }

    async fn dispatch_asr(&mut self, segment: VoiceSegment, language: Option<&str>) -> DispatchOutcome {
        if !self.normalize_for_asr {
            return match self.call_asr(&segment, language).await {
                Ok(result) => DispatchOutcome::Transcribed {
                    result,
                    audio_processing_method: AudioProcessingMethod::Original,
                },
                Err(error) => {
                    self.reset_asr().await;
                    DispatchOutcome::Error { error, segment }
                }
            };
        }

        let normalized = normalize_for_asr(&segment, self.asr_target_rms);
        match self.call_asr(&normalized, language).await {
            Ok(result) if result.is_empty_result() && self.enable_fallback_to_original => {
                match self.call_asr(&segment, language).await {
                    Ok(fallback) => DispatchOutcome::Transcribed {
                        result: fallback,
                        audio_processing_method: AudioProcessingMethod::FallbackOriginal,
                    },
                    Err(error) => {
                        self.reset_asr().await;
                        DispatchOutcome::Error { error, segment }
                    }
                }
            }
            Ok(result) => DispatchOutcome::Transcribed {
                result,
                audio_processing_method: AudioProcessingMethod::Normalized,
            },
            Err(error) => {
                self.reset_asr().await;
                DispatchOutcome::Error { error, segment }
            }
        }
    }

    async fn call_asr(&self, segment: &VoiceSegment, language: Option<&str>) -> Result<TranscriptionResult, String> {
        match tokio::time::timeout(self.provider_call_timeout, self.asr.transcribe(segment, language)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => {
                self.metrics.record_component_metric("pipeline", "provider_timeout", 1.0);
                Err("ASR provider call timed out".into())
            }
        }
    }

    /// Ask the ASR provider to drop any internal streaming/decoder state
    /// after a failed call, so the next segment starts clean.
    async fn reset_asr(&self) {
        if let Err(err) = self.asr.reset_state().await {
            warn!("ASR provider failed to reset state after an error: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioFrame, SampleFormat};
    use crate::config::VadConfig;
    use crate::metrics::MetricsCollector;
    use crate::providers::{ProviderCapabilities, WakeWordResult};
    use crate::types::Metadata;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn segment() -> VoiceSegment {
        let frame = AudioFrame::new(vec![0u8; 320], 16_000, 1, SampleFormat::PcmS16Le, 0.0).unwrap();
        VoiceSegment {
            frames: vec![frame.clone()],
            start_ts: 0.0,
            end_ts: 0.1,
            total_duration_ms: 100.0,
            chunk_count: 1,
            combined_audio: frame,
            metadata: Metadata::new(),
        }
    }

    struct StubAsr {
        calls: AtomicUsize,
        resets: AtomicUsize,
        responses: Vec<&'static str>,
    }

    impl StubAsr {
        fn new(responses: Vec<&'static str>) -> Self {
            Self { calls: AtomicUsize::new(0), resets: AtomicUsize::new(0), responses }
        }
    }

    #[async_trait]
    impl AsrProvider for StubAsr {
        async fn transcribe(&self, _: &VoiceSegment, _: Option<&str>) -> crate::error::Result<TranscriptionResult> {
            let i = self.calls.fetch_add(1, Ordering::Relaxed);
            let text = self.responses.get(i).copied().unwrap_or("");
            Ok(TranscriptionResult {
                text: text.to_owned(),
                confidence: if text.is_empty() { 0.0 } else { 0.9 },
                duration_ms: 10.0,
                error: None,
            })
        }
        async fn reset_state(&self) -> crate::error::Result<()> {
            self.resets.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        fn capabilities(&self) -> &ProviderCapabilities {
            static CAPS: ProviderCapabilities = ProviderCapabilities {
                languages: Vec::new(),
                formats: Vec::new(),
                streaming: false,
                thread_safe: false,
            };
            &CAPS
        }
    }

    struct FailingAsr;

    #[async_trait]
    impl AsrProvider for FailingAsr {
        async fn transcribe(&self, _: &VoiceSegment, _: Option<&str>) -> crate::error::Result<TranscriptionResult> {
            Err(crate::error::RuntimeError::Provider("decoder crashed".into()))
        }
        async fn reset_state(&self) -> crate::error::Result<()> {
            Ok(())
        }
        fn capabilities(&self) -> &ProviderCapabilities {
            static CAPS: ProviderCapabilities = ProviderCapabilities {
                languages: Vec::new(),
                formats: Vec::new(),
                streaming: false,
                thread_safe: false,
            };
            &CAPS
        }
    }

    struct StubWakeWord {
        detected: bool,
    }

    #[async_trait]
    impl WakeWordProvider for StubWakeWord {
        async fn detect(&self, _: &VoiceSegment) -> crate::error::Result<WakeWordResult> {
            Ok(WakeWordResult {
                detected: self.detected,
                confidence: if self.detected { 0.95 } else { 0.1 },
                wake_word: self.detected.then(|| "hey".to_owned()),
            })
        }
        fn capabilities(&self) -> &ProviderCapabilities {
            static CAPS: ProviderCapabilities = ProviderCapabilities {
                languages: Vec::new(),
                formats: Vec::new(),
                streaming: false,
                thread_safe: false,
            };
            &CAPS
        }
    }

    fn pipeline_config() -> crate::config::PipelineConfig {
        crate::config::PipelineConfig {
            wake_word_gated: true,
            provider_call_timeout_ms: 200,
            awake_idle_timeout_s: 15,
        }
    }

    #[tokio::test]
    async fn direct_mode_sends_every_segment_to_asr() {
        let mut config = pipeline_config();
        config.wake_word_gated = false;
        let asr = Arc::new(StubAsr::new(vec!["привет"]));
        let mut pipeline = AudioPipeline::new(
            &config,
            &VadConfig { normalize_for_asr: false, ..VadConfig::default() },
            asr,
            None,
            Arc::new(MetricsCollector::disabled()),
        );
        assert_eq!(pipeline.mode(), PipelineMode::DirectAsr);
        match pipeline.dispatch(segment(), Some("ru")).await {
            DispatchOutcome::Transcribed { result, audio_processing_method } => {
                assert_eq!(result.text, "привет");
                assert_eq!(audio_processing_method, AudioProcessingMethod::Original);
            }
            other => panic!("expected transcription, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wake_word_gate_withholds_asr_until_detected() {
        let config = pipeline_config();
        let asr = Arc::new(StubAsr::new(vec!["включи свет"]));
        let wake_word = Arc::new(StubWakeWord { detected: false });
        let mut pipeline = AudioPipeline::new(
            &config,
            &VadConfig { normalize_for_asr: false, ..VadConfig::default() },
            asr,
            Some(wake_word),
            Arc::new(MetricsCollector::disabled()),
        );

        match pipeline.dispatch(segment(), None).await {
            DispatchOutcome::WakeWord { detected, .. } => assert!(!detected),
            other => panic!("expected wake-word outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wake_word_detection_unlocks_asr_for_next_segment() {
        let config = pipeline_config();
        let asr = Arc::new(StubAsr::new(vec!["включи свет"]));
        let wake_word = Arc::new(StubWakeWord { detected: true });
        let mut pipeline = AudioPipeline::new(
            &config,
            &VadConfig { normalize_for_asr: false, ..VadConfig::default() },
            asr,
            Some(wake_word),
            Arc::new(MetricsCollector::disabled()),
        );

        match pipeline.dispatch(segment(), None).await {
            DispatchOutcome::WakeWord { detected, .. } => assert!(detected),
            other => panic!("expected wake-word outcome, got {other:?}"),
        }
        match pipeline.dispatch(segment(), Some("ru")).await {
            DispatchOutcome::Transcribed { result, .. } => assert_eq!(result.text, "включи свет"),
            other => panic!("expected transcription, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_normalized_result_falls_back_to_original() {
        // No wake-word provider configured, so the pipeline falls back to
        // direct-ASR mode regardless of `wake_word_gated`.
        let config = pipeline_config();
        let asr = Arc::new(StubAsr::new(vec!["", "свет выключен"]));
        let mut pipeline = AudioPipeline::new(
            &config,
            &VadConfig { normalize_for_asr: true, enable_fallback_to_original: true, ..VadConfig::default() },
            asr,
            None,
            Arc::new(MetricsCollector::disabled()),
        );
        assert_eq!(pipeline.mode(), PipelineMode::DirectAsr);

        match pipeline.dispatch(segment(), None).await {
            DispatchOutcome::Transcribed { result, audio_processing_method } => {
                assert_eq!(result.text, "свет выключен");
                assert_eq!(audio_processing_method, AudioProcessingMethod::FallbackOriginal);
            }
            other => panic!("expected fallback transcription, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn asr_error_resets_provider_state_and_returns_segment() {
        let mut config = pipeline_config();
        config.wake_word_gated = false;
        let asr = Arc::new(FailingAsr);
        let mut pipeline = AudioPipeline::new(
            &config,
            &VadConfig { normalize_for_asr: false, ..VadConfig::default() },
            asr,
            None,
            Arc::new(MetricsCollector::disabled()),
        );
        match pipeline.dispatch(segment(), None).await {
            DispatchOutcome::Error { error, .. } => assert!(error.contains("decoder crashed")),
            other => panic!("expected error outcome, got {other:?}"),
        }
    }
}
