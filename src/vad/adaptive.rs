//! Adaptive noise-floor threshold tracking and VAD calibration.

use crate::audio::AudioFrame;
use std::collections::VecDeque;

/// Maximum number of recent frame energies retained for the noise floor.
const MAX_HISTORY: usize = 100;
/// Effective threshold is clamped to this range.
const THRESHOLD_MIN: f32 = 1e-4;
const THRESHOLD_MAX: f32 = 0.1;

/// Rolling noise-floor estimator: `noise_floor := percentile(recent
/// energies, noise_percentile)`, effective threshold `:= max(base,
/// noise_floor * voice_multiplier)`, clamped to `[1e-4, 0.1]`.
pub struct AdaptiveThreshold {
    history: VecDeque<f32>,
    noise_percentile: f32,
    voice_multiplier: f32,
    last_noise_floor: f32,
}

impl AdaptiveThreshold {
    /// Create a tracker with the given percentile (1..=50) and multiplier (1..=10).
    pub fn new(noise_percentile: f32, voice_multiplier: f32) -> Self {
        Self {
            history: VecDeque::with_capacity(MAX_HISTORY),
            noise_percentile: noise_percentile.clamp(1.0, 50.0),
            voice_multiplier: voice_multiplier.clamp(1.0, 10.0),
            last_noise_floor: 0.0,
        }
    }

    /// Record one frame's energy and return the effective threshold to use
    /// against it (derived from history *including* this sample).
    pub fn push_and_threshold(&mut self, energy: f32, base_threshold: f32) -> f32 {
        self.history.push_back(energy);
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
        self.last_noise_floor = percentile(&self.history_vec(), self.noise_percentile);
        effective_threshold(base_threshold, self.last_noise_floor, self.voice_multiplier)
    }

    /// The most recently computed noise floor.
    pub fn noise_floor(&self) -> f32 {
        self.last_noise_floor
    }

    /// Clear history (used on VAD reset).
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_noise_floor = 0.0;
    }

    fn history_vec(&self) -> Vec<f32> {
        self.history.iter().copied().collect()
    }
}

fn effective_threshold(base: f32, noise_floor: f32, voice_multiplier: f32) -> f32 {
    (base.max(noise_floor * voice_multiplier)).clamp(THRESHOLD_MIN, THRESHOLD_MAX)
}

/// Linear-interpolated percentile (`0..=100`) of a slice of values.
///
/// Returns `0.0` for an empty slice.
pub fn percentile(values: &[f32], p: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f32> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let p = p.clamp(0.0, 100.0) / 100.0;
    let idx = p * (sorted.len() - 1) as f32;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = idx - lo as f32;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}

/// Calibrate a suggested VAD threshold from a batch of reference frames:
/// noise floor is the `noise_percentile` of per-frame RMS energies, and the
/// suggested threshold is `noise_floor * voice_multiplier`, clamped.
pub fn calibrate(frames: &[AudioFrame], noise_percentile: f32, voice_multiplier: f32) -> f32 {
    let energies: Vec<f32> = frames
        .iter()
        .map(|f| {
            let samples = f.to_f32_mono();
            if samples.is_empty() {
                0.0
            } else {
                let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
                (sum_sq / samples.len() as f32).sqrt()
            }
        })
        .collect();
    let noise_floor = percentile(&energies, noise_percentile.clamp(1.0, 50.0));
    effective_threshold(0.0, noise_floor, voice_multiplier.clamp(1.0, 10.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_identity() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 100.0), 5.0);
        assert_eq!(percentile(&values, 50.0), 3.0);
    }

    #[test]
    fn noise_floor_tracks_monotonic_shift() {
        let mut adaptive = AdaptiveThreshold::new(15.0, 3.0);
        for _ in 0..20 {
            adaptive.push_and_threshold(0.01, 0.02);
        }
        let floor_before = adaptive.noise_floor();
        for _ in 0..20 {
            adaptive.push_and_threshold(0.02, 0.02);
        }
        let floor_after = adaptive.noise_floor();
        // All recent energies increased by 0.01; floor must not increase by more.
        assert!(floor_after - floor_before <= 0.01 + 1e-6);
        assert!(floor_after >= floor_before);
    }
}
