//! Speech-aware RMS normalization of a completed segment, ahead of ASR.

use crate::audio::{AudioFrame, SampleFormat};
use crate::uap::VoiceSegment;

/// Minimum RMS below which audio is treated as silence/noise and left alone.
const NOISE_RMS_FLOOR: f32 = 0.01;
/// Minimum coefficient-of-variation below which audio is treated as noise
/// (tonal noise has low variation relative to its RMS; speech doesn't).
const NOISE_VARIATION_FLOOR: f32 = 0.3;
/// `cur_rms` below this is numerically silent; never amplify it.
const SILENCE_EPS: f32 = 1e-6;
/// Scale factor is clamped to this range so quiet noise is never blown up
/// and loud speech is never attenuated into inaudibility.
const SCALE_MIN: f32 = 0.3;
const SCALE_MAX: f32 = 2.0;

/// Produce a *copy* of `segment`'s combined audio, RMS-normalized toward
/// `target_rms`, unless the audio looks like noise (low RMS or low
/// variation) — in which case it is returned unchanged. The input segment
/// is never mutated; callers keep both.
pub fn normalize_for_asr(segment: &VoiceSegment, target_rms: f32) -> VoiceSegment {
    let mut out = segment.clone();
    let samples = decode_f32(&segment.combined_audio);

    let cur_rms = rms(&samples);
    let mut scale_applied = false;
    let mut scale_factor = 1.0f32;

    if cur_rms >= SILENCE_EPS {
        let variation = std_dev(&samples, cur_rms) / cur_rms;
        if variation >= NOISE_VARIATION_FLOOR && cur_rms >= NOISE_RMS_FLOOR {
            scale_factor = (target_rms / cur_rms).clamp(SCALE_MIN, SCALE_MAX);
            let scaled: Vec<f32> = samples.iter().map(|s| (s * scale_factor).clamp(-1.0, 1.0)).collect();
            out.combined_audio = encode_f32(&scaled, &segment.combined_audio);
            scale_applied = true;
        }
    }

    out.metadata
        .insert("normalized_for_asr".into(), true.into());
    out.metadata
        .insert("normalization_applied".into(), scale_applied.into());
    out.metadata
        .insert("normalization_scale".into(), f64::from(scale_factor).into());
    out
}

fn decode_f32(frame: &AudioFrame) -> Vec<f32> {
    match frame.format {
        SampleFormat::PcmS16Le => frame
            .bytes()
            .chunks_exact(2)
            .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32767.0)
            .collect(),
    }
}

fn encode_f32(samples: &[f32], template: &AudioFrame) -> AudioFrame {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    AudioFrame::new(
        bytes,
        template.sample_rate,
        template.channels,
        template.format,
        template.captured_at_s,
    )
    .unwrap_or_else(|_| template.clone())
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

fn std_dev(samples: &[f32], rms_value: f32) -> f32 {
    // std(x) for zero-mean-ish speech audio: sqrt(mean(x^2) - mean(x)^2).
    // rms_value already gives sqrt(mean(x^2)); compute mean separately.
    if samples.is_empty() {
        return 0.0;
    }
    let mean = samples.iter().sum::<f32>() / samples.len() as f32;
    let variance = (rms_value * rms_value - mean * mean).max(0.0);
    variance.sqrt()
}
