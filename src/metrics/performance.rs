//! Weighted performance scoring over the collector's current snapshot.

use super::MetricsCollector;
use std::sync::atomic::Ordering;

/// Score weight given to processing overhead (VAD/UAP latency vs. threshold).
const WEIGHT_OVERHEAD: f64 = 0.20;
/// Score weight given to VAD accuracy/health (cache hit rate, violation rate).
const WEIGHT_VAD: f64 = 0.30;
/// Score weight given to intent recognition success rate.
const WEIGHT_INTENT: f64 = 0.25;
/// Score weight given to component-level health (corruption/reset counters).
const WEIGHT_COMPONENT: f64 = 0.15;
/// Score weight given to overall system health (concurrency, resolver health).
const WEIGHT_SYSTEM: f64 = 0.10;

/// A processing-time threshold, in milliseconds, above which VAD latency is
/// flagged in a recommendation regardless of its contribution to the score.
const VAD_LATENCY_RECOMMENDATION_THRESHOLD_MS: f64 = 50.0;

/// Weighted health report produced by [`MetricsCollector::validate_performance`].
#[derive(Debug, Clone)]
pub struct PerformanceReport {
    /// Overall score in `[0, 1]`; 1.0 is perfectly healthy.
    pub score: f64,
    pub overhead_score: f64,
    pub vad_score: f64,
    pub intent_score: f64,
    pub component_score: f64,
    pub system_score: f64,
    /// Human-readable, threshold-banded recommendations. Empty when healthy.
    pub recommendations: Vec<String>,
}

pub(super) fn validate(collector: &MetricsCollector) -> PerformanceReport {
    let snap = collector.snapshot();
    let mut recommendations = Vec::new();

    // Overhead: fraction of VAD chunks that stayed within the latency budget.
    let overhead_score = if snap.vad.chunks_processed > 0 {
        let violation_rate =
            snap.vad.threshold_violations as f64 / snap.vad.chunks_processed as f64;
        (1.0 - violation_rate).clamp(0.0, 1.0)
    } else {
        1.0
    };
    if snap.vad.avg_processing_time_ms > VAD_LATENCY_RECOMMENDATION_THRESHOLD_MS {
        recommendations.push(format!(
            "average VAD processing time {:.1}ms exceeds {:.0}ms; investigate caching or algorithm cost",
            snap.vad.avg_processing_time_ms, VAD_LATENCY_RECOMMENDATION_THRESHOLD_MS
        ));
    }

    // VAD health: cache hit rate plus a timeout/overflow penalty.
    let overflow_penalty = if snap.vad.chunks_processed > 0 {
        (snap.vad.timeouts + snap.vad.buffer_overflows) as f64 / snap.vad.chunks_processed as f64
    } else {
        0.0
    };
    let vad_score = if snap.vad.chunks_processed > 0 {
        (0.5 + 0.5 * snap.vad.cache_hit_rate - overflow_penalty).clamp(0.0, 1.0)
    } else {
        1.0
    };
    if snap.vad.cache_hit_rate < 0.5 && snap.vad.chunks_processed > 0 {
        recommendations.push(format!(
            "VAD cache hit rate {:.0}% is low; check adaptive-threshold cache sizing",
            snap.vad.cache_hit_rate * 100.0
        ));
    }
    if overflow_penalty > 0.05 {
        recommendations.push(
            "frequent segment timeouts/overflows; consider raising buffer_size_frames or max_segment_duration_s".into(),
        );
    }

    // Intent: mean success rate across domains seen this epoch.
    let intent_score = if snap.intents.is_empty() {
        1.0
    } else {
        snap.intents.values().map(|i| i.success_rate).sum::<f64>() / snap.intents.len() as f64
    };
    if !snap.intents.is_empty() && intent_score < 0.7 {
        recommendations.push(format!(
            "intent success rate {:.0}% is below 70%; review recognizer confidence thresholds",
            intent_score * 100.0
        ));
    }

    // Component health: penalize for frame corruption / invariant resets,
    // scaled against the number of chunks observed this epoch.
    let corruption = collector.corruption_frames.load(Ordering::Relaxed) as f64;
    let resets = collector.invariant_resets.load(Ordering::Relaxed) as f64;
    let denom = snap.vad.chunks_processed.max(1) as f64;
    let component_score = (1.0 - (corruption + resets) / denom).clamp(0.0, 1.0);
    if resets > 0.0 {
        recommendations.push(format!(
            "{resets:.0} state-machine invariant reset(s) observed this epoch"
        ));
    }

    // System: concurrency headroom plus resolver threshold-violation rate.
    let resolver_penalty = if snap.resolver.count > 0 {
        snap.resolver.threshold_violations as f64 / snap.resolver.count as f64
    } else {
        0.0
    };
    let concurrency_penalty = if snap.peak_concurrent_actions > 0 {
        (snap.current_concurrent_actions as f64 / snap.peak_concurrent_actions as f64 - 1.0)
            .max(0.0)
    } else {
        0.0
    };
    let system_score = (1.0 - resolver_penalty - concurrency_penalty).clamp(0.0, 1.0);
    if resolver_penalty > 0.1 {
        recommendations.push(format!(
            "entity resolution exceeded its latency threshold on {:.0}% of attempts",
            resolver_penalty * 100.0
        ));
    }

    let score = WEIGHT_OVERHEAD * overhead_score
        + WEIGHT_VAD * vad_score
        + WEIGHT_INTENT * intent_score
        + WEIGHT_COMPONENT * component_score
        + WEIGHT_SYSTEM * system_score;

    PerformanceReport {
        score: score.clamp(0.0, 1.0),
        overhead_score,
        vad_score,
        intent_score,
        component_score,
        system_score,
        recommendations,
    }
}
