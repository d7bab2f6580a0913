//! Universal Audio Processor: the four-state segmentation machine that
//! turns a stream of per-frame VAD decisions into [`VoiceSegment`]s.
//!
//! States: `Silence`, `VoiceOnset`, `VoiceActive`, and the transient
//! `VoiceEnded` (collapsed back to `Silence` within the same
//! [`UniversalAudioProcessor::process`] call — callers only ever observe
//! `Silence`/`VoiceOnset`/`VoiceActive` from [`UniversalAudioProcessor::state`]).

mod normalize;

pub use normalize::normalize_for_asr;

use crate::audio::AudioFrame;
use crate::config::UapConfig;
use crate::metrics::MetricsCollector;
use crate::types::Metadata;
use crate::vad::VadResult;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::warn;

/// Observable state of the segmentation machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UapState {
    /// No speech in progress.
    Silence,
    /// The first voice frame(s) of a new segment (pre-buffer just copied in).
    VoiceOnset,
    /// A segment is actively accumulating frames.
    VoiceActive,
}

/// A contiguous sequence of frames judged to contain one utterance.
#[derive(Debug, Clone)]
pub struct VoiceSegment {
    /// Frames in capture order.
    pub frames: Vec<AudioFrame>,
    /// Capture timestamp of the first frame (seconds).
    pub start_ts: f64,
    /// Capture timestamp at which the segment was closed (seconds).
    pub end_ts: f64,
    /// Total duration spanned by the segment, in milliseconds.
    pub total_duration_ms: f64,
    /// Number of frames making up the segment.
    pub chunk_count: usize,
    /// Concatenated PCM across all frames (identical sample rate/channels).
    pub combined_audio: AudioFrame,
    /// Flags and derived stats (`timeout_forced`, `overflow_forced`,
    /// `average_energy`, `total_bytes`, `chunk_timestamps`, ...).
    pub metadata: Metadata,
}

impl VoiceSegment {
    /// `true` when this segment was forced out by a timeout or overflow
    /// guard rather than by the VAD observing silence.
    pub fn was_force_completed(&self) -> bool {
        self.metadata
            .get("timeout_forced")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
            || self
                .metadata
                .get("overflow_forced")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false)
    }
}

/// Accumulator for frames plus their VAD energies, used while a segment is
/// being built so `average_energy`/`chunk_timestamps` metadata is cheap to
/// compute at emission time.
struct Accumulator {
    frames: Vec<AudioFrame>,
    energy_sum: f64,
    timestamps: Vec<f64>,
    segment_start_ts: f64,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            frames: Vec::new(),
            energy_sum: 0.0,
            timestamps: Vec::new(),
            segment_start_ts: 0.0,
        }
    }

    fn push(&mut self, frame: AudioFrame, energy: f32) {
        self.timestamps.push(frame.captured_at_s);
        self.energy_sum += f64::from(energy);
        self.frames.push(frame);
    }

    fn len(&self) -> usize {
        self.frames.len()
    }

    fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn clear(&mut self) {
        self.frames.clear();
        self.energy_sum = 0.0;
        self.timestamps.clear();
    }
}

/// Result of feeding one frame into the processor.
pub struct UapOutput {
    /// State after processing this frame.
    pub state: UapState,
    /// A segment, if one was emitted (naturally, by timeout, or by overflow).
    pub segment: Option<VoiceSegment>,
    /// Wall-clock time spent in this call, in milliseconds.
    pub processing_latency_ms: f64,
}

/// Single-threaded segmentation state machine. One instance per audio
/// source/session; never shares buffers across instances.
pub struct UniversalAudioProcessor {
    config: UapConfig,
    metrics: Arc<MetricsCollector>,
    state: UapState,
    pre_buffer: VecDeque<AudioFrame>,
    voice_buffer: Accumulator,
}

impl UniversalAudioProcessor {
    /// Construct a processor bound to one [`MetricsCollector`] instance.
    pub fn new(config: UapConfig, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            config,
            metrics,
            state: UapState::Silence,
            pre_buffer: VecDeque::new(),
            voice_buffer: Accumulator::new(),
        }
    }

    /// Current machine state.
    pub fn state(&self) -> UapState {
        self.state
    }

    /// Discard the current segment in progress (used on session cancellation).
    /// The pre-buffer is retained; §5 requires the UAP not to corrupt state
    /// on cancellation of the surrounding session.
    pub fn discard(&mut self) {
        self.voice_buffer.clear();
        self.state = UapState::Silence;
    }

    /// Feed one frame and `VadResult` through the state machine.
    pub fn process(&mut self, frame: AudioFrame, vad: &VadResult) -> UapOutput {
        let started = std::time::Instant::now();
        self.metrics.record_chunk_processed(vad);

        let segment = match self.state {
            UapState::Silence => self.handle_silence(frame, vad),
            UapState::VoiceOnset | UapState::VoiceActive => self.handle_active(frame, vad),
        };

        UapOutput {
            state: self.state,
            segment,
            processing_latency_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }

    fn push_pre_buffer(&mut self, frame: AudioFrame) {
        self.pre_buffer.push_back(frame);
        while self.pre_buffer.len() > self.config.pre_buffer_frames {
            self.pre_buffer.pop_front();
        }
    }

    fn handle_silence(&mut self, frame: AudioFrame, vad: &VadResult) -> Option<VoiceSegment> {
        if vad.is_voice {
            self.voice_buffer.clear();
            self.voice_buffer.segment_start_ts = self
                .pre_buffer
                .front()
                .map(|f| f.captured_at_s)
                .unwrap_or(frame.captured_at_s);
            for pre in self.pre_buffer.drain(..) {
                self.voice_buffer.push(pre, 0.0);
            }
            self.voice_buffer.push(frame, vad.energy);
            self.state = UapState::VoiceOnset;
            self.check_force_emit()
        } else {
            self.push_pre_buffer(frame);
            None
        }
    }

    fn handle_active(&mut self, frame: AudioFrame, vad: &VadResult) -> Option<VoiceSegment> {
        if !vad.is_voice {
            let segment = self.emit_segment(frame.captured_at_s, false, false);
            self.state = UapState::Silence;
            self.push_pre_buffer(frame);
            return segment;
        }

        let mismatched = self
            .voice_buffer
            .frames
            .last()
            .map(|last| !last.is_compatible_with(&frame))
            .unwrap_or(false);

        if mismatched {
            warn!("sample rate/channel mismatch mid-segment; starting a new segment");
            let mut segment = self.emit_segment(frame.captured_at_s, false, false);
            self.voice_buffer.segment_start_ts = frame.captured_at_s;
            self.voice_buffer.push(frame, vad.energy);
            self.state = UapState::VoiceOnset;
            if let Some(forced) = self.check_force_emit() {
                segment = Some(forced);
            }
            return segment;
        }

        self.voice_buffer.push(frame, vad.energy);
        self.state = UapState::VoiceActive;
        self.check_force_emit()
    }

    /// Timeout/overflow guard, run after every append while a segment is
    /// accumulating. Never drops audio: a forced emission still hands the
    /// buffered frames to the caller.
    fn check_force_emit(&mut self) -> Option<VoiceSegment> {
        if self.voice_buffer.is_empty() {
            return None;
        }
        let end_ts = self
            .voice_buffer
            .frames
            .last()
            .map(|f| f.captured_at_s)
            .unwrap_or(self.voice_buffer.segment_start_ts);
        let age_s = end_ts - self.voice_buffer.segment_start_ts;

        if age_s > self.config.max_segment_duration_s {
            self.metrics.record_timeout();
            let segment = self.emit_segment(end_ts, true, false);
            self.state = UapState::Silence;
            return segment;
        }
        if self.voice_buffer.len() > self.config.buffer_size_frames {
            self.metrics.record_overflow();
            let segment = self.emit_segment(end_ts, false, true);
            self.state = UapState::Silence;
            return segment;
        }
        None
    }

    fn emit_segment(
        &mut self,
        end_ts: f64,
        timeout_forced: bool,
        overflow_forced: bool,
    ) -> Option<VoiceSegment> {
        if self.voice_buffer.is_empty() {
            // State-machine invariant violation: emit requested with an
            // empty buffer. Reset and continue rather than propagate.
            warn!("segment emission requested with an empty voice buffer; resetting");
            self.state = UapState::Silence;
            return None;
        }

        let Accumulator {
            frames,
            energy_sum,
            timestamps,
            segment_start_ts,
        } = std::mem::replace(&mut self.voice_buffer, Accumulator::new());

        let chunk_count = frames.len();
        let combined_audio = match concat_frames(&frames) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("failed to concatenate voice segment frames: {err}");
                return None;
            }
        };

        let total_duration_ms = (end_ts - segment_start_ts).max(0.0) * 1000.0;
        let average_energy = if chunk_count > 0 {
            energy_sum / chunk_count as f64
        } else {
            0.0
        };

        let mut metadata = Metadata::new();
        metadata.insert("timeout_forced".into(), timeout_forced.into());
        metadata.insert("overflow_forced".into(), overflow_forced.into());
        metadata.insert("average_energy".into(), average_energy.into());
        metadata.insert("total_bytes".into(), combined_audio.bytes().len().into());
        metadata.insert(
            "chunk_timestamps".into(),
            serde_json::Value::Array(
                timestamps
                    .into_iter()
                    .map(|t| serde_json::Number::from_f64(t).map_or(serde_json::Value::Null, Into::into))
                    .collect(),
            ),
        );

        self.metrics.record_voice_segment(total_duration_ms);

        Some(VoiceSegment {
            frames,
            start_ts: segment_start_ts,
            end_ts,
            total_duration_ms,
            chunk_count,
            combined_audio,
            metadata,
        })
    }
}

/// Concatenate PCM bytes across frames sharing sample rate/channels/format.
fn concat_frames(frames: &[AudioFrame]) -> Result<AudioFrame, String> {
    let first = frames.first().ok_or("cannot concatenate zero frames")?;
    let mut bytes = Vec::new();
    for frame in frames {
        if !frame.is_compatible_with(first) {
            return Err("mismatched sample rate/channels in segment".into());
        }
        bytes.extend_from_slice(frame.bytes());
    }
    AudioFrame::new(
        bytes,
        first.sample_rate,
        first.channels,
        first.format,
        first.captured_at_s,
    )
}
