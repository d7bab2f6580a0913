//! Voice Activity Detection: per-frame voice/silence decisions.
//!
//! Two variants share one interface, [`VoiceActivityDetector::process_frame`]:
//! [`SimpleVad`] (RMS energy with hysteresis) and [`AdvancedVad`] (adds
//! zero-crossing rate gating, an adaptive noise-floor threshold, and
//! multi-frame smoothing). Failures never propagate: any non-finite
//! intermediate value yields a silent, zero-energy result, logged at most
//! once per decade of occurrences.

mod adaptive;
mod hysteresis;

pub use adaptive::{AdaptiveThreshold, calibrate};

use crate::audio::AudioFrame;
use crate::config::VadConfig;
use hysteresis::Hysteresis;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::warn;

/// Width of the multi-frame smoothing window used by [`AdvancedVad`].
const SMOOTHING_WINDOW: usize = 5;
/// Fraction of frames in the smoothing window that must be raw-voice for
/// the smoothed decision to be "voice".
const SMOOTHING_VOICE_FRACTION: f32 = 0.6;

/// Per-frame VAD output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadResult {
    /// Whether this frame is classified as voice (after hysteresis).
    pub is_voice: bool,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Normalized RMS energy in `[0, 1]`.
    pub energy: f32,
    /// Zero-crossing rate in `[0, 1]`. Zero for `SimpleVad`.
    pub zcr: f32,
    /// Effective adaptive threshold used for this decision, in `[0, 1]`.
    pub adaptive_threshold: f32,
    /// Wall-clock time spent processing this frame, in milliseconds.
    pub processing_time_ms: f64,
    /// Always `false`; reserved for callers that layer caching on top.
    pub cache_hit: bool,
}

impl VadResult {
    fn silent(processing_time_ms: f64) -> Self {
        Self {
            is_voice: false,
            confidence: 0.0,
            energy: 0.0,
            zcr: 0.0,
            adaptive_threshold: 0.0,
            processing_time_ms,
            cache_hit: false,
        }
    }
}

/// Common interface implemented by both VAD variants.
pub trait VoiceActivityDetector {
    /// Classify one frame as voice or silence.
    fn process_frame(&mut self, frame: &AudioFrame) -> VadResult;

    /// Reset all internal state (hysteresis counters, smoothing buffers,
    /// adaptive threshold history).
    fn reset(&mut self);
}

/// A counter that logs at most once per decade (1st, 11th, 21st, ...) of
/// occurrences, per the failure-semantics requirement in §4.1.
#[derive(Default)]
struct DecadeLogger {
    count: AtomicU64,
}

impl DecadeLogger {
    fn note(&self, context: &str) {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        if n % 10 == 1 {
            warn!("vad arithmetic failure #{n} in {context}, returning silent result");
        }
    }
}

/// Normalized RMS energy of a frame already scaled to `[-1, 1]`.
fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt().clamp(0.0, 1.0)
}

/// Zero-crossing rate: sign changes divided by `len - 1`.
fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let mut crossings = 0usize;
    for pair in samples.windows(2) {
        if (pair[0] >= 0.0) != (pair[1] >= 0.0) {
            crossings += 1;
        }
    }
    (crossings as f32 / (samples.len() - 1) as f32).clamp(0.0, 1.0)
}

/// DC removal, a first-order high-pass difference, then pre-emphasis —
/// applied in that order, matching §4.1's preprocessing cascade.
fn preprocess(samples: &[f32]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let mean = samples.iter().sum::<f32>() / samples.len() as f32;
    let dc_removed: Vec<f32> = samples.iter().map(|s| s - mean).collect();

    let mut highpassed = Vec::with_capacity(dc_removed.len());
    let mut prev = 0.0f32;
    for &s in &dc_removed {
        highpassed.push(s - prev);
        prev = s;
    }

    let mut emphasized = Vec::with_capacity(highpassed.len());
    let mut prev = 0.0f32;
    for &s in &highpassed {
        emphasized.push(s - 0.97 * prev);
        prev = s;
    }
    emphasized
}

fn has_non_finite(samples: &[f32]) -> bool {
    samples.iter().any(|s| !s.is_finite())
}

/// RMS-energy VAD with hysteresis. No ZCR, no adaptive threshold, no
/// preprocessing — the cheapest variant, suitable as a baseline or for
/// `vad.use_zero_crossing_rate = false`.
pub struct SimpleVad {
    threshold: f32,
    hysteresis: Hysteresis,
    failures: DecadeLogger,
}

impl SimpleVad {
    /// Build a simple VAD from configuration.
    pub fn new(config: &VadConfig) -> Self {
        Self {
            threshold: config.energy_threshold.max(0.0),
            hysteresis: Hysteresis::new(
                config.voice_frames_required.max(1),
                config.silence_frames_required.max(1),
            ),
            failures: DecadeLogger::default(),
        }
    }
}

impl VoiceActivityDetector for SimpleVad {
    fn process_frame(&mut self, frame: &AudioFrame) -> VadResult {
        let started = Instant::now();
        let samples = frame.to_f32_mono();

        if has_non_finite(&samples) {
            self.failures.note("SimpleVad::process_frame");
            return VadResult::silent(elapsed_ms(started));
        }

        let energy = rms_energy(&samples);
        // Threshold 0 → every non-empty frame is raw-voice (boundary case).
        let raw_voice = !samples.is_empty() && energy > self.threshold;
        let is_voice = self.hysteresis.update(raw_voice);

        VadResult {
            is_voice,
            confidence: if raw_voice { energy.clamp(0.0, 1.0) } else { 0.0 },
            energy,
            zcr: 0.0,
            adaptive_threshold: self.threshold,
            processing_time_ms: elapsed_ms(started),
            cache_hit: false,
        }
    }

    fn reset(&mut self) {
        self.hysteresis.reset();
    }
}

/// One smoothing-window entry.
#[derive(Clone, Copy)]
struct SmoothingSample {
    raw_voice: bool,
    energy: f32,
    zcr: f32,
}

/// Energy + ZCR VAD with an adaptive noise-floor threshold and multi-frame
/// smoothing, tuned for Russian/English speech (see §4.1 rationale: low-ZCR
/// vowels, higher-ZCR fricatives).
pub struct AdvancedVad {
    base_threshold: f32,
    sensitivity: f32,
    use_zcr: bool,
    adaptive: Option<AdaptiveThreshold>,
    smoothing: VecDeque<SmoothingSample>,
    hysteresis: Hysteresis,
    failures: DecadeLogger,
}

impl AdvancedVad {
    /// Build an advanced VAD from configuration.
    pub fn new(config: &VadConfig) -> Self {
        Self {
            base_threshold: config.energy_threshold.max(0.0),
            sensitivity: config.sensitivity.clamp(0.1, 3.0),
            use_zcr: config.use_zero_crossing_rate,
            adaptive: config
                .adaptive_threshold
                .then(|| AdaptiveThreshold::new(config.noise_percentile, config.voice_multiplier)),
            smoothing: VecDeque::with_capacity(SMOOTHING_WINDOW),
            hysteresis: Hysteresis::new(
                config.voice_frames_required.max(1),
                config.silence_frames_required.max(1),
            ),
            failures: DecadeLogger::default(),
        }
    }

    fn effective_threshold(&mut self, energy: f32) -> f32 {
        match self.adaptive.as_mut() {
            Some(adaptive) => adaptive.push_and_threshold(energy, self.base_threshold),
            None => self.base_threshold,
        }
    }

    fn raw_voice(&self, energy: f32, zcr: f32, t_eff: f32) -> bool {
        let strong_energy = energy > 1.2 * t_eff;
        let speech_zcr = energy > 0.5 * t_eff && (0.01..=0.35).contains(&zcr);
        let low_zcr_vowel = energy > 0.3 * t_eff && zcr <= 0.08;
        strong_energy || speech_zcr || low_zcr_vowel
    }

    fn push_smoothing(&mut self, sample: SmoothingSample) {
        self.smoothing.push_back(sample);
        while self.smoothing.len() > SMOOTHING_WINDOW {
            self.smoothing.pop_front();
        }
    }

    fn smoothed_voice(&self, noise_floor: f32) -> bool {
        if self.smoothing.is_empty() {
            return false;
        }
        let n = self.smoothing.len() as f32;
        let voice_fraction = self.smoothing.iter().filter(|s| s.raw_voice).count() as f32 / n;
        let mean_energy: f32 = self.smoothing.iter().map(|s| s.energy).sum::<f32>() / n;
        let energy_gate = mean_energy > (self.base_threshold).max(noise_floor * 3.0);

        let zcr_gate = if self.use_zcr {
            let mean_zcr: f32 = self.smoothing.iter().map(|s| s.zcr).sum::<f32>() / n;
            (0.01..=0.35).contains(&mean_zcr) || mean_zcr <= 0.08
        } else {
            true
        };

        voice_fraction >= SMOOTHING_VOICE_FRACTION && energy_gate && zcr_gate
    }
}

impl VoiceActivityDetector for AdvancedVad {
    fn process_frame(&mut self, frame: &AudioFrame) -> VadResult {
        let started = Instant::now();
        let raw_samples = frame.to_f32_mono();

        if has_non_finite(&raw_samples) {
            self.failures.note("AdvancedVad::process_frame");
            return VadResult::silent(elapsed_ms(started));
        }

        let processed = preprocess(&raw_samples);
        if has_non_finite(&processed) {
            self.failures.note("AdvancedVad::preprocess");
            return VadResult::silent(elapsed_ms(started));
        }

        let energy = rms_energy(&processed);
        let zcr = if self.use_zcr {
            zero_crossing_rate(&processed)
        } else {
            0.0
        };

        let t_eff = self.effective_threshold(energy) / self.sensitivity;
        let noise_floor = self
            .adaptive
            .as_ref()
            .map(AdaptiveThreshold::noise_floor)
            .unwrap_or(0.0);

        let raw_voice = !raw_samples.is_empty() && self.raw_voice(energy, zcr, t_eff);
        self.push_smoothing(SmoothingSample {
            raw_voice,
            energy,
            zcr,
        });

        let smoothed = self.smoothed_voice(noise_floor);
        let is_voice = self.hysteresis.update(smoothed);

        let confidence = if smoothed {
            (energy / t_eff.max(1e-6)).clamp(0.0, 1.0)
        } else {
            0.0
        };

        VadResult {
            is_voice,
            confidence,
            energy,
            zcr,
            adaptive_threshold: t_eff,
            processing_time_ms: elapsed_ms(started),
            cache_hit: false,
        }
    }

    fn reset(&mut self) {
        self.hysteresis.reset();
        self.smoothing.clear();
        if let Some(adaptive) = self.adaptive.as_mut() {
            adaptive.reset();
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SampleFormat;

    fn frame_from_samples(samples: &[f32]) -> AudioFrame {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for &s in samples {
            let v = (s.clamp(-1.0, 1.0) * 32767.0) as i16;
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        AudioFrame::new(bytes, 16_000, 1, SampleFormat::PcmS16Le, 0.0).unwrap()
    }

    #[test]
    fn empty_frame_is_silent() {
        let mut vad = SimpleVad::new(&VadConfig::default());
        let frame = frame_from_samples(&[]);
        let result = vad.process_frame(&frame);
        assert_eq!(result.energy, 0.0);
        assert_eq!(result.zcr, 0.0);
        assert!(!result.is_voice);
    }

    #[test]
    fn single_sample_zcr_is_zero() {
        assert_eq!(zero_crossing_rate(&[0.5]), 0.0);
    }

    #[test]
    fn zero_threshold_marks_all_nonempty_frames_raw_voice() {
        let mut config = VadConfig::default();
        config.energy_threshold = 0.0;
        config.voice_frames_required = 1;
        let mut vad = SimpleVad::new(&config);
        let frame = frame_from_samples(&[0.01; 160]);
        let result = vad.process_frame(&frame);
        assert!(result.is_voice);
    }

    #[test]
    fn hysteresis_requires_consecutive_runs() {
        let mut config = VadConfig::default();
        config.energy_threshold = 0.05;
        config.voice_frames_required = 3;
        config.silence_frames_required = 2;
        let mut vad = SimpleVad::new(&config);

        let loud = frame_from_samples(&vec![0.3; 160]);
        let quiet = frame_from_samples(&vec![0.0; 160]);

        // Two voice frames, not enough to flip state.
        assert!(!vad.process_frame(&loud).is_voice);
        assert!(!vad.process_frame(&loud).is_voice);
        // Third consecutive voice frame flips to voice.
        assert!(vad.process_frame(&loud).is_voice);

        // One silence frame is not enough to flip back.
        assert!(vad.process_frame(&quiet).is_voice);
        // Second consecutive silence frame flips to silence.
        assert!(!vad.process_frame(&quiet).is_voice);
    }
}
