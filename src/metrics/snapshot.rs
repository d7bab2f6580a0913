//! Read-side aggregation: turns the internal counters into the
//! derived-average views callers actually want.

use super::MetricsCollector;
use std::collections::HashMap;
use std::sync::atomic::Ordering;

/// VAD + advanced-VAD + quality-VAD dimension.
#[derive(Debug, Clone, Default)]
pub struct VadSnapshot {
    pub chunks_processed: u64,
    pub voice_chunks: u64,
    pub silence_chunks: u64,
    pub avg_processing_time_ms: f64,
    pub max_processing_time_ms: f64,
    pub buffer_overflows: u64,
    pub timeouts: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub voice_segments: u64,
    pub total_voice_duration_ms: f64,
    pub threshold_violations: u64,
    pub avg_real_time_factor: f64,
    pub avg_processing_efficiency: f64,
    pub avg_buffer_utilization: f64,
    pub avg_energy_level: f64,
    pub avg_zcr_value: f64,
    pub avg_confidence: f64,
}

/// One domain's fire-and-forget action metrics.
#[derive(Debug, Clone, Default)]
pub struct ActionDomainSnapshot {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub avg_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub error_rate: f64,
    pub timeouts: u64,
    pub retries: u64,
}

/// One intent's recognition metrics.
#[derive(Debug, Clone, Default)]
pub struct IntentSnapshot {
    pub count: u64,
    pub avg_confidence: f64,
    pub avg_processing_time_ms: f64,
    pub success_rate: f64,
}

/// One session's activity metrics.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub intent_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub domains_used: Vec<String>,
    pub satisfaction: Option<f32>,
}

/// Contextual entity resolution metrics.
#[derive(Debug, Clone, Default)]
pub struct ResolverSnapshot {
    pub count: u64,
    pub successes: u64,
    pub failures: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub threshold_violations: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub by_domain: HashMap<String, u64>,
    pub by_command_type: HashMap<String, u64>,
    pub recent_confidence: Vec<f32>,
}

/// A consistent-per-dimension snapshot of every tracked metric.
#[derive(Debug, Clone, Default)]
pub struct MetricSnapshot {
    pub vad: VadSnapshot,
    pub actions_by_domain: HashMap<String, ActionDomainSnapshot>,
    pub peak_concurrent_actions: i64,
    pub current_concurrent_actions: i64,
    pub intents: HashMap<String, IntentSnapshot>,
    pub sessions: HashMap<String, SessionSnapshot>,
    pub components: HashMap<String, HashMap<String, f64>>,
    pub resolver: ResolverSnapshot,
}

impl MetricSnapshot {
    /// The `n` most-used intents, sorted by usage count descending.
    pub fn top_intents(&self, n: usize) -> Vec<(String, IntentSnapshot)> {
        let mut ranked: Vec<(String, IntentSnapshot)> = self
            .intents
            .iter()
            .map(|(name, stats)| (name.clone(), stats.clone()))
            .collect();
        ranked.sort_by(|a, b| b.1.count.cmp(&a.1.count));
        ranked.truncate(n);
        ranked
    }
}

pub(super) fn build(collector: &MetricsCollector) -> MetricSnapshot {
    let vad = {
        let c = collector.vad.lock().unwrap_or_else(|e| e.into_inner());
        let chunks = c.chunks_processed.max(1) as f64;
        let cache_total = c.cache_hits + c.cache_misses;
        VadSnapshot {
            chunks_processed: c.chunks_processed,
            voice_chunks: c.voice_chunks,
            silence_chunks: c.silence_chunks,
            avg_processing_time_ms: c.processing_time_sum_ms / chunks,
            max_processing_time_ms: c.processing_time_max_ms,
            buffer_overflows: c.buffer_overflows,
            timeouts: c.timeouts,
            cache_hits: c.cache_hits,
            cache_misses: c.cache_misses,
            cache_hit_rate: if cache_total > 0 {
                c.cache_hits as f64 / cache_total as f64
            } else {
                0.0
            },
            voice_segments: c.voice_segments,
            total_voice_duration_ms: c.total_voice_duration_ms,
            threshold_violations: c.threshold_violations,
            avg_real_time_factor: if c.rtf_count > 0 {
                c.rtf_sum / c.rtf_count as f64
            } else {
                0.0
            },
            avg_processing_efficiency: if c.rtf_count > 0 {
                c.efficiency_sum / c.rtf_count as f64
            } else {
                0.0
            },
            avg_buffer_utilization: if c.buffer_utilization_count > 0 {
                c.buffer_utilization_sum / c.buffer_utilization_count as f64
            } else {
                0.0
            },
            avg_energy_level: if c.quality_count > 0 {
                c.energy_sum / c.quality_count as f64
            } else {
                0.0
            },
            avg_zcr_value: if c.quality_count > 0 {
                c.zcr_sum / c.quality_count as f64
            } else {
                0.0
            },
            avg_confidence: if c.quality_count > 0 {
                c.confidence_sum / c.quality_count as f64
            } else {
                0.0
            },
        }
    };

    let actions_by_domain = {
        let actions = collector.actions.lock().unwrap_or_else(|e| e.into_inner());
        actions
            .iter()
            .map(|(domain, stats)| {
                let total = stats.total.max(1) as f64;
                (
                    domain.clone(),
                    ActionDomainSnapshot {
                        total: stats.total,
                        successful: stats.successful,
                        failed: stats.failed,
                        avg_duration_ms: stats.duration_sum_ms / total,
                        min_duration_ms: stats.duration_min_ms,
                        max_duration_ms: stats.duration_max_ms,
                        error_rate: stats.failed as f64 / total,
                        timeouts: stats.timeouts,
                        retries: stats.retries,
                    },
                )
            })
            .collect()
    };

    let intents = {
        let intents = collector.intents.lock().unwrap_or_else(|e| e.into_inner());
        intents
            .iter()
            .map(|(name, stats)| {
                let count = stats.count.max(1) as f64;
                (
                    name.clone(),
                    IntentSnapshot {
                        count: stats.count,
                        avg_confidence: f64::from(stats.confidence_sum) / count,
                        avg_processing_time_ms: stats.processing_time_sum_ms / count,
                        success_rate: stats.successes as f64 / count,
                    },
                )
            })
            .collect()
    };

    let sessions = {
        let sessions = collector.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .iter()
            .map(|(id, stats)| {
                (
                    id.clone(),
                    SessionSnapshot {
                        intent_count: stats.intent_count,
                        success_count: stats.success_count,
                        failure_count: stats.failure_count,
                        domains_used: stats.domains_used.clone(),
                        satisfaction: stats.satisfaction,
                    },
                )
            })
            .collect()
    };

    let components = collector
        .components
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone();

    let resolver = {
        let r = collector.resolver.lock().unwrap_or_else(|e| e.into_inner());
        let count = r.count.max(1) as f64;
        ResolverSnapshot {
            count: r.count,
            successes: r.successes,
            failures: r.failures,
            avg_latency_ms: r.latency_sum_ms / count,
            min_latency_ms: r.latency_min_ms,
            max_latency_ms: r.latency_max_ms,
            threshold_violations: r.threshold_violations,
            cache_hits: r.cache_hits,
            cache_misses: r.cache_misses,
            by_domain: r.by_domain.clone(),
            by_command_type: r.by_command_type.clone(),
            recent_confidence: r.confidence_ring.clone(),
        }
    };

    MetricSnapshot {
        vad,
        actions_by_domain,
        peak_concurrent_actions: collector.peak_concurrent_actions.load(Ordering::Relaxed),
        current_concurrent_actions: collector.current_concurrent_actions.load(Ordering::Relaxed),
        intents,
        sessions,
        components,
        resolver,
    }
}
