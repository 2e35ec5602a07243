use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::TickKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CycleOutcome {
    Applied,
    /// Completed but older than what is already shown.
    Stale,
    Failed,
    SkippedInactive,
    SkippedNotReady,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureMetrics {
    pub seq: u64,
    pub kind: TickKind,
    pub timestamp: DateTime<Utc>,
    pub encode_ms: Option<u64>,
    pub request_ms: Option<u64>,
    pub payload_bytes: Option<usize>,
    pub total_ms: u64,
    pub outcome: CycleOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleCounters {
    pub dispatched: u64,
    pub applied: u64,
    pub stale: u64,
    pub failed: u64,
    pub skipped_inactive: u64,
    pub skipped_not_ready: u64,
    pub skipped_busy: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub counters: CycleCounters,
    pub recent_captures: Vec<CaptureMetrics>,
}
