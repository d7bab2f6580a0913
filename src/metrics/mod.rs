//! Unified metrics collector: the one process-wide mutable singleton
//! (constructed once, injected everywhere — never a hidden global).
//!
//! Writes from the hot path (VAD/UAP) must be non-blocking and
//! constant-time; each dimension below is guarded by its own small mutex
//! so that, e.g., a burst of intent recording never contends with the
//! per-frame VAD counters. Reads produce a consistent snapshot *per
//! dimension*, not necessarily across dimensions (§5).

mod performance;
mod snapshot;

pub use performance::PerformanceReport;
pub use snapshot::{
    ActionDomainSnapshot, IntentSnapshot, MetricSnapshot, ResolverSnapshot, SessionSnapshot,
    VadSnapshot,
};

use crate::config::MonitoringConfig;
use crate::vad::VadResult;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tracing::warn;

#[derive(Default)]
struct VadCounters {
    chunks_processed: u64,
    voice_chunks: u64,
    silence_chunks: u64,
    processing_time_sum_ms: f64,
    processing_time_max_ms: f64,
    buffer_overflows: u64,
    timeouts: u64,
    cache_hits: u64,
    cache_misses: u64,
    voice_segments: u64,
    total_voice_duration_ms: f64,
    threshold_violations: u64,
    // Advanced VAD running averages.
    rtf_sum: f64,
    efficiency_sum: f64,
    rtf_count: u64,
    buffer_utilization_sum: f64,
    buffer_utilization_count: u64,
    // Quality VAD running averages.
    energy_sum: f64,
    zcr_sum: f64,
    confidence_sum: f64,
    quality_count: u64,
}

#[derive(Default, Clone)]
struct ActionDomainStats {
    total: u64,
    successful: u64,
    failed: u64,
    timeouts: u64,
    retries: u64,
    duration_sum_ms: f64,
    duration_min_ms: f64,
    duration_max_ms: f64,
    last_updated: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Default, Clone)]
struct IntentStats {
    count: u64,
    confidence_sum: f32,
    processing_time_sum_ms: f64,
    successes: u64,
    last_used: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Default, Clone)]
struct SessionStats {
    start: Option<chrono::DateTime<chrono::Utc>>,
    last_activity: Option<chrono::DateTime<chrono::Utc>>,
    intent_count: u64,
    success_count: u64,
    failure_count: u64,
    domains_used: Vec<String>,
    satisfaction: Option<f32>,
}

#[derive(Default, Clone)]
struct ResolverStats {
    count: u64,
    successes: u64,
    failures: u64,
    latency_sum_ms: f64,
    latency_min_ms: f64,
    latency_max_ms: f64,
    threshold_violations: u64,
    cache_hits: u64,
    cache_misses: u64,
    by_domain: HashMap<String, u64>,
    by_command_type: HashMap<String, u64>,
    confidence_ring: Vec<f32>,
}

const CONFIDENCE_RING_CAPACITY: usize = 100;

/// The unified metrics aggregator. Cheap to clone via [`std::sync::Arc`];
/// construct exactly one per process and share it.
pub struct MetricsCollector {
    enabled: bool,
    latency_threshold_ms: f64,

    vad: Mutex<VadCounters>,
    actions: Mutex<HashMap<String, ActionDomainStats>>,
    peak_concurrent_actions: AtomicI64,
    current_concurrent_actions: AtomicI64,
    intents: Mutex<HashMap<String, IntentStats>>,
    sessions: Mutex<HashMap<String, SessionStats>>,
    components: Mutex<HashMap<String, HashMap<String, f64>>>,
    resolver: Mutex<ResolverStats>,

    corruption_frames: AtomicU64,
    invariant_resets: AtomicU64,
}

impl MetricsCollector {
    /// Construct a collector. When `config.metrics_enabled` is false, every
    /// recording method is a no-op.
    pub fn new(config: &MonitoringConfig) -> Self {
        Self {
            enabled: config.metrics_enabled,
            latency_threshold_ms: config.latency_threshold_ms,
            vad: Mutex::new(VadCounters::default()),
            actions: Mutex::new(HashMap::new()),
            peak_concurrent_actions: AtomicI64::new(0),
            current_concurrent_actions: AtomicI64::new(0),
            intents: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            components: Mutex::new(HashMap::new()),
            resolver: Mutex::new(ResolverStats::default()),
            corruption_frames: AtomicU64::new(0),
            invariant_resets: AtomicU64::new(0),
        }
    }

    /// A disabled collector, useful for tests that don't care about metrics.
    pub fn disabled() -> Self {
        Self::new(&MonitoringConfig {
            metrics_enabled: false,
            ..MonitoringConfig::default()
        })
    }

    // ---- VAD / UAP hot path -------------------------------------------------

    /// Record one VAD decision. Non-blocking: a single short-held lock on
    /// the VAD dimension only.
    pub fn record_chunk_processed(&self, result: &VadResult) {
        if !self.enabled {
            return;
        }
        let mut vad = self.vad.lock().unwrap_or_else(|e| e.into_inner());
        vad.chunks_processed += 1;
        if result.is_voice {
            vad.voice_chunks += 1;
        } else {
            vad.silence_chunks += 1;
        }
        vad.processing_time_sum_ms += result.processing_time_ms;
        vad.processing_time_max_ms = vad.processing_time_max_ms.max(result.processing_time_ms);
        if result.cache_hit {
            vad.cache_hits += 1;
        } else {
            vad.cache_misses += 1;
        }
        vad.energy_sum += f64::from(result.energy);
        vad.zcr_sum += f64::from(result.zcr);
        vad.confidence_sum += f64::from(result.confidence);
        vad.quality_count += 1;

        if result.processing_time_ms > self.latency_threshold_ms {
            vad.threshold_violations += 1;
            warn!(
                "VAD processing time {:.2}ms exceeded threshold {:.2}ms",
                result.processing_time_ms, self.latency_threshold_ms
            );
        }
    }

    /// Record a forced emission due to the segment timeout guard.
    pub fn record_timeout(&self) {
        if !self.enabled {
            return;
        }
        self.vad.lock().unwrap_or_else(|e| e.into_inner()).timeouts += 1;
    }

    /// Record a forced emission due to the buffer overflow guard.
    pub fn record_overflow(&self) {
        if !self.enabled {
            return;
        }
        self.vad
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .buffer_overflows += 1;
    }

    /// Record a completed voice segment and its duration.
    pub fn record_voice_segment(&self, duration_ms: f64) {
        if !self.enabled {
            return;
        }
        let mut vad = self.vad.lock().unwrap_or_else(|e| e.into_inner());
        vad.voice_segments += 1;
        vad.total_voice_duration_ms += duration_ms;
    }

    /// Record an advanced-VAD real-time-factor sample
    /// (`processing_time_ms / audio_duration_ms`).
    pub fn record_real_time_factor(&self, rtf: f64) {
        if !self.enabled {
            return;
        }
        let mut vad = self.vad.lock().unwrap_or_else(|e| e.into_inner());
        vad.rtf_sum += rtf;
        vad.efficiency_sum += 1.0 / rtf.max(1e-3);
        vad.rtf_count += 1;
    }

    /// Record a buffer-utilization sample (`len / capacity`, in `[0, 1]`).
    pub fn record_buffer_utilization(&self, utilization: f64) {
        if !self.enabled {
            return;
        }
        let mut vad = self.vad.lock().unwrap_or_else(|e| e.into_inner());
        vad.buffer_utilization_sum += utilization;
        vad.buffer_utilization_count += 1;
    }

    /// Record a frame dropped for corruption (unreadable PCM/length mismatch).
    pub fn record_frame_corruption(&self) {
        self.corruption_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a state-machine invariant violation that triggered a reset.
    pub fn record_invariant_reset(&self) {
        self.invariant_resets.fetch_add(1, Ordering::Relaxed);
    }

    // ---- Actions (fire-and-forget) -----------------------------------------

    /// Mark the start of a fire-and-forget action in `domain`. Returns a
    /// guard; drop it (or call [`ActionGuard::finish`]) to record the
    /// outcome and decrement the concurrency counter.
    pub fn start_action(&self, domain: impl Into<String>) -> ActionGuard<'_> {
        let current = self.current_concurrent_actions.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_concurrent_actions.fetch_max(current, Ordering::Relaxed);
        ActionGuard {
            collector: self,
            domain: domain.into(),
            started: std::time::Instant::now(),
            finished: false,
        }
    }

    fn finish_action(&self, domain: &str, duration_ms: f64, success: bool, timed_out: bool) {
        self.current_concurrent_actions.fetch_sub(1, Ordering::Relaxed);
        if !self.enabled {
            return;
        }
        let mut actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        let stats = actions.entry(domain.to_owned()).or_default();
        stats.total += 1;
        if success {
            stats.successful += 1;
        } else {
            stats.failed += 1;
        }
        if timed_out {
            stats.timeouts += 1;
        }
        stats.duration_sum_ms += duration_ms;
        stats.duration_min_ms = if stats.total == 1 {
            duration_ms
        } else {
            stats.duration_min_ms.min(duration_ms)
        };
        stats.duration_max_ms = stats.duration_max_ms.max(duration_ms);
        stats.last_updated = Some(chrono::Utc::now());
    }

    /// Record a retry against an in-flight action's domain.
    pub fn record_action_retry(&self, domain: &str) {
        if !self.enabled {
            return;
        }
        let mut actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        actions.entry(domain.to_owned()).or_default().retries += 1;
    }

    // ---- Intents ------------------------------------------------------------

    /// Record a recognized intent's outcome.
    pub fn record_intent(
        &self,
        name: &str,
        confidence: f32,
        processing_time_ms: f64,
        success: bool,
    ) {
        if !self.enabled {
            return;
        }
        let mut intents = self.intents.lock().unwrap_or_else(|e| e.into_inner());
        let stats = intents.entry(name.to_owned()).or_default();
        stats.count += 1;
        stats.confidence_sum += confidence;
        stats.processing_time_sum_ms += processing_time_ms;
        if success {
            stats.successes += 1;
        }
        stats.last_used = Some(chrono::Utc::now());
    }

    // ---- Sessions -------------------------------------------------------------

    /// Record session activity: one intent dispatched in `domain`.
    pub fn record_session_activity(&self, session_id: &str, domain: &str, success: bool) {
        if !self.enabled {
            return;
        }
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let stats = sessions.entry(session_id.to_owned()).or_default();
        if stats.start.is_none() {
            stats.start = Some(chrono::Utc::now());
        }
        stats.last_activity = Some(chrono::Utc::now());
        stats.intent_count += 1;
        if success {
            stats.success_count += 1;
        } else {
            stats.failure_count += 1;
        }
        if !stats.domains_used.iter().any(|d| d == domain) {
            stats.domains_used.push(domain.to_owned());
        }
    }

    /// Record a user-satisfaction signal for a session (`0.0..=1.0`).
    pub fn record_session_satisfaction(&self, session_id: &str, satisfaction: f32) {
        if !self.enabled {
            return;
        }
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.entry(session_id.to_owned()).or_default().satisfaction =
            Some(satisfaction.clamp(0.0, 1.0));
    }

    // ---- Components -----------------------------------------------------------

    /// Record an arbitrary named metric for `component` (e.g. ASR's
    /// `resampling_operations`, the wake-word spotter's `detection_operations`).
    pub fn record_component_metric(&self, component: &str, key: &str, value: f64) {
        if !self.enabled {
            return;
        }
        let mut components = self.components.lock().unwrap_or_else(|e| e.into_inner());
        let entry = components.entry(component.to_owned()).or_default();
        *entry.entry(key.to_owned()).or_insert(0.0) += value;
    }

    // ---- Contextual disambiguation (entity resolver) --------------------------

    /// Record one entity resolution attempt.
    #[allow(clippy::too_many_arguments)]
    pub fn record_resolution(
        &self,
        domain: &str,
        command_type: &str,
        success: bool,
        latency_ms: f64,
        cache_hit: bool,
    ) {
        if !self.enabled {
            return;
        }
        let mut resolver = self.resolver.lock().unwrap_or_else(|e| e.into_inner());
        resolver.count += 1;
        if success {
            resolver.successes += 1;
        } else {
            resolver.failures += 1;
        }
        resolver.latency_sum_ms += latency_ms;
        resolver.latency_min_ms = if resolver.count == 1 {
            latency_ms
        } else {
            resolver.latency_min_ms.min(latency_ms)
        };
        resolver.latency_max_ms = resolver.latency_max_ms.max(latency_ms);
        if latency_ms > self.latency_threshold_ms {
            resolver.threshold_violations += 1;
        }
        if cache_hit {
            resolver.cache_hits += 1;
        } else {
            resolver.cache_misses += 1;
        }
        *resolver.by_domain.entry(domain.to_owned()).or_insert(0) += 1;
        *resolver
            .by_command_type
            .entry(command_type.to_owned())
            .or_insert(0) += 1;
    }

    /// Record a resolution confidence sample into the rolling 100-value buffer.
    pub fn record_resolution_confidence(&self, confidence: f32) {
        if !self.enabled {
            return;
        }
        let mut resolver = self.resolver.lock().unwrap_or_else(|e| e.into_inner());
        resolver.confidence_ring.push(confidence.clamp(0.0, 1.0));
        while resolver.confidence_ring.len() > CONFIDENCE_RING_CAPACITY {
            resolver.confidence_ring.remove(0);
        }
    }

    // ---- Snapshot / reset / validation -----------------------------------------

    /// Produce a consistent snapshot of every dimension. Each dimension is
    /// read under its own lock; dimensions are not snapshotted atomically
    /// with respect to one another.
    pub fn snapshot(&self) -> MetricSnapshot {
        snapshot::build(self)
    }

    /// Compute the weighted performance score and recommendations (§4.4).
    pub fn validate_performance(&self) -> PerformanceReport {
        performance::validate(self)
    }

    /// Zero all counters and rotate the epoch.
    pub fn reset(&self) {
        *self.vad.lock().unwrap_or_else(|e| e.into_inner()) = VadCounters::default();
        self.actions.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.peak_concurrent_actions.store(0, Ordering::Relaxed);
        self.current_concurrent_actions.store(0, Ordering::Relaxed);
        self.intents.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.components.lock().unwrap_or_else(|e| e.into_inner()).clear();
        *self.resolver.lock().unwrap_or_else(|e| e.into_inner()) = ResolverStats::default();
        self.corruption_frames.store(0, Ordering::Relaxed);
        self.invariant_resets.store(0, Ordering::Relaxed);
    }
}

/// RAII guard returned by [`MetricsCollector::start_action`]. Records the
/// outcome when [`ActionGuard::finish`] is called, or as a failed/timed-out
/// action if dropped without an explicit outcome (matching "fire-and-forget"
/// actions whose task was aborted).
pub struct ActionGuard<'a> {
    collector: &'a MetricsCollector,
    domain: String,
    started: std::time::Instant,
    finished: bool,
}

impl ActionGuard<'_> {
    /// Record the action's outcome.
    pub fn finish(mut self, success: bool, timed_out: bool) {
        let elapsed = self.started.elapsed().as_secs_f64() * 1000.0;
        self.collector.finish_action(&self.domain, elapsed, success, timed_out);
        self.finished = true;
    }
}

impl Drop for ActionGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let elapsed = self.started.elapsed().as_secs_f64() * 1000.0;
            self.collector.finish_action(&self.domain, elapsed, false, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vad_result(is_voice: bool, processing_time_ms: f64) -> VadResult {
        VadResult {
            is_voice,
            confidence: 0.5,
            energy: 0.1,
            zcr: 0.05,
            adaptive_threshold: 0.02,
            processing_time_ms,
            cache_hit: false,
        }
    }

    #[test]
    fn counters_are_monotonic_within_epoch() {
        let collector = MetricsCollector::new(&MonitoringConfig::default());
        for _ in 0..5 {
            collector.record_chunk_processed(&vad_result(true, 1.0));
        }
        let snap = collector.snapshot();
        assert_eq!(snap.vad.chunks_processed, 5);
        collector.record_chunk_processed(&vad_result(false, 1.0));
        let snap2 = collector.snapshot();
        assert!(snap2.vad.chunks_processed >= snap.vad.chunks_processed);
    }

    #[test]
    fn cache_hit_rate_formula() {
        let collector = MetricsCollector::new(&MonitoringConfig::default());
        let mut hit = vad_result(true, 1.0);
        hit.cache_hit = true;
        collector.record_chunk_processed(&hit);
        collector.record_chunk_processed(&vad_result(true, 1.0));
        let snap = collector.snapshot();
        assert!((snap.vad.cache_hit_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn peak_concurrent_never_below_current() {
        let collector = MetricsCollector::new(&MonitoringConfig::default());
        let g1 = collector.start_action("lights");
        let g2 = collector.start_action("lights");
        let snap = collector.snapshot();
        assert!(snap.peak_concurrent_actions >= snap.current_concurrent_actions);
        g1.finish(true, false);
        g2.finish(true, false);
    }

    #[test]
    fn top_intents_sorted_by_count_descending() {
        let collector = MetricsCollector::new(&MonitoringConfig::default());
        collector.record_intent("lights.on", 0.9, 5.0, true);
        for _ in 0..3 {
            collector.record_intent("lights.off", 0.9, 5.0, true);
        }
        for _ in 0..2 {
            collector.record_intent("timer.set", 0.9, 5.0, true);
        }
        let snap = collector.snapshot();
        let top = snap.top_intents(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0, "lights.off");
        assert_eq!(top[0].1.count, 3);
        assert_eq!(top[1].0, "timer.set");
        assert_eq!(top[1].1.count, 2);
    }

    #[test]
    fn reset_zeroes_counters() {
        let collector = MetricsCollector::new(&MonitoringConfig::default());
        collector.record_chunk_processed(&vad_result(true, 1.0));
        collector.reset();
        let snap = collector.snapshot();
        assert_eq!(snap.vad.chunks_processed, 0);
    }
}
