use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;

use crate::analysis::{AnalysisRequest, Analyzer};
use crate::camera::CameraSession;
use crate::display::DisplayStore;
use crate::encoder::FrameEncoder;
use crate::error::EncodeError;
use crate::metrics::{CaptureMetrics, CycleOutcome, MetricsCollector};

use super::{CycleRunner, Tick};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

/// One capture cycle bound to a camera session: wait for readiness, encode
/// the current frame, submit it, and apply whatever comes back.
pub struct AnalysisCycle<A: Analyzer> {
    session: Arc<CameraSession>,
    analyzer: Arc<A>,
    encoder: FrameEncoder,
    display: DisplayStore,
    metrics: MetricsCollector,
    text: String,
}

#[derive(Default)]
struct Timings {
    encode_ms: Option<u64>,
    request_ms: Option<u64>,
    payload_bytes: Option<usize>,
}

impl<A: Analyzer> AnalysisCycle<A> {
    pub fn new(
        session: Arc<CameraSession>,
        analyzer: Arc<A>,
        encoder: FrameEncoder,
        display: DisplayStore,
        metrics: MetricsCollector,
        text: impl Into<String>,
    ) -> Self {
        Self {
            session,
            analyzer,
            encoder,
            display,
            metrics,
            text: text.into(),
        }
    }

    pub fn session(&self) -> &Arc<CameraSession> {
        &self.session
    }

    /// Run the cycle for `tick` and record its metrics.
    pub async fn execute(&self, tick: Tick) -> CycleOutcome {
        let started = Instant::now();
        let mut timings = Timings::default();
        let outcome = self.perform(tick, &mut timings).await;

        self.metrics
            .record_capture(CaptureMetrics {
                seq: tick.seq,
                kind: tick.kind,
                timestamp: Utc::now(),
                encode_ms: timings.encode_ms,
                request_ms: timings.request_ms,
                payload_bytes: timings.payload_bytes,
                total_ms: started.elapsed().as_millis() as u64,
                outcome,
            })
            .await;

        outcome
    }

    async fn perform(&self, tick: Tick, timings: &mut Timings) -> CycleOutcome {
        if !self.session.is_active() {
            log_debug!("tick {} skipped: camera session inactive", tick.seq);
            return CycleOutcome::SkippedInactive;
        }

        if self.session.wait_ready().await.is_err() {
            log_debug!("tick {} skipped: camera released before ready", tick.seq);
            return CycleOutcome::SkippedInactive;
        }

        let Some(source) = self.session.source() else {
            return CycleOutcome::SkippedInactive;
        };

        let encode_start = Instant::now();
        let encoder = self.encoder;
        let encoded = match tokio::task::spawn_blocking(move || encoder.encode(&*source)).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(EncodeError::NotReady)) => {
                log_debug!("tick {} skipped: video source not ready", tick.seq);
                return CycleOutcome::SkippedNotReady;
            }
            Ok(Err(err)) => {
                log_error!("tick {} encode failed: {}", tick.seq, err);
                return CycleOutcome::Failed;
            }
            Err(err) => {
                log_error!("tick {} encode worker join failed: {}", tick.seq, err);
                return CycleOutcome::Failed;
            }
        };
        timings.encode_ms = Some(encode_start.elapsed().as_millis() as u64);
        timings.payload_bytes = Some(encoded.bytes.len());

        let request_start = Instant::now();
        let request = AnalysisRequest::new(self.text.clone(), encoded);
        let result = self.analyzer.analyze(request).await;
        timings.request_ms = Some(request_start.elapsed().as_millis() as u64);

        match result {
            // The session may have been released while the request was in
            // flight; the result is applied anyway.
            Ok(result) => {
                if self.display.apply(tick.seq, result) {
                    log_info!(
                        "tick {} applied ({}ms round trip)",
                        tick.seq,
                        timings.request_ms.unwrap_or_default()
                    );
                    CycleOutcome::Applied
                } else {
                    log_debug!("tick {} result dropped as stale", tick.seq);
                    CycleOutcome::Stale
                }
            }
            Err(err) => {
                log_error!("tick {} analyze error: {}", tick.seq, err.diagnostic());
                CycleOutcome::Failed
            }
        }
    }
}

impl<A: Analyzer> CycleRunner for AnalysisCycle<A> {
    async fn run(&self, tick: Tick) {
        self.execute(tick).await;
    }
}
