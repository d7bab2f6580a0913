//! Core audio data types shared across the pipeline.
//!
//! Capture, playback, and provider implementations are external
//! collaborators (see the crate-level docs); this module only defines the
//! wire-level record the hot path operates on.

use std::collections::HashMap;

/// PCM sample format tag.
///
/// Required fidelity for this runtime is 16 kHz mono signed 16-bit
/// little-endian; other rates/formats must be rejected or resampled
/// upstream of the VAD/UAP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed 16-bit little-endian PCM.
    PcmS16Le,
}

impl SampleFormat {
    /// Bits per sample for this format.
    pub fn bits_per_sample(self) -> u32 {
        match self {
            SampleFormat::PcmS16Le => 16,
        }
    }
}

/// One immutable slice of captured audio.
///
/// Invariant: `bytes.len() == channels as usize * sample_rate as usize *
/// duration_secs / (8 / bits_per_sample)` is not checked by the type
/// itself (duration is derived from the byte length); callers must not
/// mutate `bytes` once constructed, and [`AudioFrame::validate`] checks
/// the one invariant that *is* mechanically checkable: that the byte
/// length is a whole number of sample-frames.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw PCM bytes. Immutable after construction.
    bytes: Vec<u8>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Sample format.
    pub format: SampleFormat,
    /// Monotonic capture timestamp, in seconds, as a float so sub-frame
    /// timing survives (matches the source's definition of "monotonic").
    pub captured_at_s: f64,
    /// Optional caller-supplied metadata (e.g. device id, sequence number).
    pub metadata: HashMap<String, String>,
}

impl AudioFrame {
    /// Construct a frame, rejecting byte buffers that aren't a whole
    /// number of sample-frames for the given channel count and format.
    pub fn new(
        bytes: Vec<u8>,
        sample_rate: u32,
        channels: u16,
        format: SampleFormat,
        captured_at_s: f64,
    ) -> Result<Self, String> {
        let frame = Self {
            bytes,
            sample_rate,
            channels,
            format,
            captured_at_s,
            metadata: HashMap::new(),
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Bytes per single-channel sample for this frame's format.
    fn bytes_per_sample(&self) -> usize {
        (self.format.bits_per_sample() / 8) as usize
    }

    /// Checks that the byte buffer holds a whole number of interleaved
    /// sample-frames; this is the only invariant from §3 that is
    /// mechanically verifiable without external duration metadata.
    pub fn validate(&self) -> Result<(), String> {
        let frame_bytes = self.bytes_per_sample() * self.channels.max(1) as usize;
        if frame_bytes == 0 {
            return Err("zero-width audio frame".to_owned());
        }
        if self.bytes.len() % frame_bytes != 0 {
            return Err(format!(
                "audio frame length {} is not a multiple of {frame_bytes} bytes/sample-frame",
                self.bytes.len()
            ));
        }
        Ok(())
    }

    /// Raw PCM bytes. Read-only: frames are immutable after construction.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of interleaved sample-frames in this chunk.
    pub fn len_samples(&self) -> usize {
        let frame_bytes = self.bytes_per_sample() * self.channels.max(1) as usize;
        if frame_bytes == 0 {
            0
        } else {
            self.bytes.len() / frame_bytes
        }
    }

    /// Duration of this frame in milliseconds, derived from its length and
    /// sample rate.
    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        (self.len_samples() as f64 / self.sample_rate as f64) * 1000.0
    }

    /// Decode to normalized `f32` samples in `[-1, 1]` (mono: channels are
    /// averaged). Used by the VAD engine and normalization.
    pub fn to_f32_mono(&self) -> Vec<f32> {
        match self.format {
            SampleFormat::PcmS16Le => {
                let channels = self.channels.max(1) as usize;
                let mut out = Vec::with_capacity(self.len_samples());
                for frame in self.bytes.chunks_exact(2 * channels) {
                    let mut acc = 0.0f32;
                    for ch in frame.chunks_exact(2) {
                        let sample = i16::from_le_bytes([ch[0], ch[1]]);
                        acc += f32::from(sample) / 32768.0;
                    }
                    out.push(acc / channels as f32);
                }
                out
            }
        }
    }

    /// Whether two frames share the format this runtime requires to be
    /// concatenated into one segment (sample rate and channel count).
    pub fn is_compatible_with(&self, other: &AudioFrame) -> bool {
        self.sample_rate == other.sample_rate
            && self.channels == other.channels
            && self.format == other.format
    }
}

