mod types;

pub use types::{CaptureMetrics, CycleCounters, CycleOutcome, MetricsSnapshot};

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;

const MAX_RECENT_CAPTURES: usize = 20;

/// Per-cycle timings and outcome counters, shared by the scheduler and the
/// cycles it dispatches.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

struct MetricsState {
    recent_captures: VecDeque<CaptureMetrics>,
    counters: CycleCounters,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                recent_captures: VecDeque::with_capacity(MAX_RECENT_CAPTURES),
                counters: CycleCounters::default(),
            })),
        }
    }

    pub async fn record_dispatch(&self) {
        self.inner.lock().await.counters.dispatched += 1;
    }

    pub async fn record_busy_skip(&self) {
        self.inner.lock().await.counters.skipped_busy += 1;
    }

    /// Record a finished cycle, keeping only the most recent entries.
    pub async fn record_capture(&self, metrics: CaptureMetrics) {
        let mut state = self.inner.lock().await;

        let counters = &mut state.counters;
        match metrics.outcome {
            CycleOutcome::Applied => counters.applied += 1,
            CycleOutcome::Stale => counters.stale += 1,
            CycleOutcome::Failed => counters.failed += 1,
            CycleOutcome::SkippedInactive => counters.skipped_inactive += 1,
            CycleOutcome::SkippedNotReady => counters.skipped_not_ready += 1,
        }

        if state.recent_captures.len() >= MAX_RECENT_CAPTURES {
            state.recent_captures.pop_front();
        }
        state.recent_captures.push_back(metrics);
    }

    pub async fn counters(&self) -> CycleCounters {
        self.inner.lock().await.counters.clone()
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let state = self.inner.lock().await;
        MetricsSnapshot {
            counters: state.counters.clone(),
            recent_captures: state.recent_captures.iter().cloned().collect(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::TickKind;
    use chrono::Utc;

    fn entry(seq: u64, outcome: CycleOutcome) -> CaptureMetrics {
        CaptureMetrics {
            seq,
            kind: TickKind::Periodic,
            timestamp: Utc::now(),
            encode_ms: None,
            request_ms: None,
            payload_bytes: None,
            total_ms: 0,
            outcome,
        }
    }

    #[tokio::test]
    async fn keeps_bounded_history_and_counts_outcomes() {
        let metrics = MetricsCollector::new();
        for seq in 0..25 {
            let outcome = if seq % 5 == 0 {
                CycleOutcome::Failed
            } else {
                CycleOutcome::Applied
            };
            metrics.record_capture(entry(seq, outcome)).await;
        }
        metrics.record_busy_skip().await;

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.recent_captures.len(), MAX_RECENT_CAPTURES);
        assert_eq!(snapshot.recent_captures[0].seq, 5);
        assert_eq!(snapshot.counters.failed, 5);
        assert_eq!(snapshot.counters.applied, 20);
        assert_eq!(snapshot.counters.skipped_busy, 1);
    }
}
