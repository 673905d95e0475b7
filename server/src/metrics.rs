use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::EngineError;

const LATENCY_BUCKET_COUNT: usize = 12;
const LATENCY_BUCKETS_MS: [u64; LATENCY_BUCKET_COUNT] =
    [1, 2, 5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000];

#[derive(Clone, Debug, Serialize)]
pub struct LatencySnapshot {
    pub buckets_ms: Vec<u64>,
    pub counts: Vec<u64>,
    pub overflow: u64,
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: u64,
}

#[derive(Default)]
struct LatencyMetrics {
    buckets: [AtomicU64; LATENCY_BUCKET_COUNT],
    overflow: AtomicU64,
    count: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl LatencyMetrics {
    fn record(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);

        match LATENCY_BUCKETS_MS.iter().position(|bucket| ms <= *bucket) {
            Some(idx) => self.buckets[idx].fetch_add(1, Ordering::Relaxed),
            None => self.overflow.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total_ms = self.total_ms.load(Ordering::Relaxed);
        let avg_ms = if count > 0 {
            total_ms as f64 / count as f64
        } else {
            0.0
        };
        LatencySnapshot {
            buckets_ms: LATENCY_BUCKETS_MS.to_vec(),
            counts: self
                .buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
            overflow: self.overflow.load(Ordering::Relaxed),
            count,
            avg_ms,
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct HttpMetricsSnapshot {
    pub session: LatencySnapshot,
    pub score: LatencySnapshot,
    pub leaderboard: LatencySnapshot,
}

#[derive(Default)]
pub struct HttpMetrics {
    session: LatencyMetrics,
    score: LatencyMetrics,
    leaderboard: LatencyMetrics,
}

impl HttpMetrics {
    pub fn record_session(&self, duration: Duration) {
        self.session.record(duration);
    }

    pub fn record_score(&self, duration: Duration) {
        self.score.record(duration);
    }

    pub fn record_leaderboard(&self, duration: Duration) {
        self.leaderboard.record(duration);
    }

    pub fn snapshot(&self) -> HttpMetricsSnapshot {
        HttpMetricsSnapshot {
            session: self.session.snapshot(),
            score: self.score.snapshot(),
            leaderboard: self.leaderboard.snapshot(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct EngineMetricsSnapshot {
    pub sessions_free: u64,
    pub sessions_paid: u64,
    pub sessions_denied: u64,
    pub scores_accepted: u64,
    pub scores_rejected_validation: u64,
    pub scores_rejected_authentication: u64,
    pub scores_rejected_store: u64,
    pub new_high_scores: u64,
    pub degraded_writes: u64,
    pub store_errors: u64,
}

/// Outcome counters for the engine operations.
#[derive(Default)]
pub struct EngineMetrics {
    sessions_free: AtomicU64,
    sessions_paid: AtomicU64,
    sessions_denied: AtomicU64,
    scores_accepted: AtomicU64,
    scores_rejected_validation: AtomicU64,
    scores_rejected_authentication: AtomicU64,
    scores_rejected_store: AtomicU64,
    new_high_scores: AtomicU64,
    degraded_writes: AtomicU64,
    store_errors: AtomicU64,
}

impl EngineMetrics {
    pub fn inc_session(&self, paid: bool) {
        if paid {
            self.sessions_paid.fetch_add(1, Ordering::Relaxed);
        } else {
            self.sessions_free.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_session_denied(&self) {
        self.sessions_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_score_accepted(&self, new_high_score: bool) {
        self.scores_accepted.fetch_add(1, Ordering::Relaxed);
        if new_high_score {
            self.new_high_scores.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_score_rejected(&self, err: &EngineError) {
        let counter = match err {
            EngineError::Validation(_) => &self.scores_rejected_validation,
            EngineError::Authentication(_) | EngineError::QuotaExceeded { .. } => {
                &self.scores_rejected_authentication
            }
            EngineError::StoreUnavailable(_) => &self.scores_rejected_store,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_degraded_writes(&self, count: usize) {
        self.degraded_writes
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn inc_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineMetricsSnapshot {
        EngineMetricsSnapshot {
            sessions_free: self.sessions_free.load(Ordering::Relaxed),
            sessions_paid: self.sessions_paid.load(Ordering::Relaxed),
            sessions_denied: self.sessions_denied.load(Ordering::Relaxed),
            scores_accepted: self.scores_accepted.load(Ordering::Relaxed),
            scores_rejected_validation: self.scores_rejected_validation.load(Ordering::Relaxed),
            scores_rejected_authentication: self
                .scores_rejected_authentication
                .load(Ordering::Relaxed),
            scores_rejected_store: self.scores_rejected_store.load(Ordering::Relaxed),
            new_high_scores: self.new_high_scores.load(Ordering::Relaxed),
            degraded_writes: self.degraded_writes.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }
}
