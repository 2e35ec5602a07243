use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::metrics::MetricsCollector;

use super::{CycleRunner, Tick, TickKind};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const DEFAULT_PERIOD: Duration = Duration::from_millis(3_000);

/// Hands ticks to the runner as detached tasks.
///
/// Usable with or without the periodic timer running, so manual triggers and
/// the timer share one sequence counter and one in-flight count.
pub struct Dispatcher<R: CycleRunner> {
    runner: Arc<R>,
    next_seq: Arc<AtomicU64>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Option<usize>,
    metrics: MetricsCollector,
}

impl<R: CycleRunner> Clone for Dispatcher<R> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            next_seq: Arc::clone(&self.next_seq),
            in_flight: Arc::clone(&self.in_flight),
            max_in_flight: self.max_in_flight,
            metrics: self.metrics.clone(),
        }
    }
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<R: CycleRunner> Dispatcher<R> {
    pub fn new(runner: Arc<R>, max_in_flight: Option<usize>, metrics: MetricsCollector) -> Self {
        Self {
            runner,
            next_seq: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight,
            metrics,
        }
    }

    /// Number ticks from `next_seq` instead of a private counter. Dispatchers
    /// built for successive runs share one so sequence numbers keep rising.
    pub fn with_sequence(mut self, next_seq: Arc<AtomicU64>) -> Self {
        self.next_seq = next_seq;
        self
    }

    /// Spawn one cycle. Returns `None` only when an in-flight cap is set and
    /// reached; without a cap every tick runs, overlapping freely.
    pub async fn dispatch(&self, kind: TickKind) -> Option<Tick> {
        let Some(guard) = self.reserve_slot() else {
            log_debug!(
                "{:?} tick skipped: {} cycles in flight",
                kind,
                self.in_flight.load(Ordering::SeqCst)
            );
            self.metrics.record_busy_skip().await;
            return None;
        };

        let tick = Tick {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            kind,
            dispatched_at: Instant::now(),
        };
        self.metrics.record_dispatch().await;
        log_debug!("dispatching {:?} tick {}", tick.kind, tick.seq);

        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move {
            let _guard = guard;
            runner.run(tick).await;
        });

        Some(tick)
    }

    fn reserve_slot(&self) -> Option<InFlightGuard> {
        match self.max_in_flight {
            Some(max) => self
                .in_flight
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
                .ok()?,
            None => self.in_flight.fetch_add(1, Ordering::SeqCst),
        };
        Some(InFlightGuard(Arc::clone(&self.in_flight)))
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn runner(&self) -> &Arc<R> {
        &self.runner
    }
}

/// Fixed-period capture trigger. `Idle -> Running -> Idle`; it never stops
/// on its own.
pub struct CaptureScheduler<R: CycleRunner> {
    dispatcher: Dispatcher<R>,
    period: Duration,
    ticker: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl<R: CycleRunner> CaptureScheduler<R> {
    pub fn new(dispatcher: Dispatcher<R>, period: Duration) -> Self {
        Self {
            dispatcher,
            period,
            ticker: None,
            cancel_token: None,
        }
    }

    /// Run one cycle now, then one every `period`. A running timer is
    /// stopped first so at most one ever exists.
    pub async fn start(&mut self) {
        if self.is_running() {
            log_info!("capture scheduler restarting");
            if let Err(err) = self.stop().await {
                log_warn!("previous capture timer did not shut down cleanly: {err:?}");
            }
        }

        self.dispatcher.dispatch(TickKind::Initial).await;

        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let dispatcher = self.dispatcher.clone();
        let period = self.period;

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        log_info!("capture timer shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        dispatcher.dispatch(TickKind::Periodic).await;
                    }
                }
            }
        });

        self.ticker = Some(handle);
        self.cancel_token = Some(cancel_token);
        log_info!("capture scheduler running every {}ms", self.period.as_millis());
    }

    /// One extra cycle; the periodic timer is left untouched.
    pub async fn trigger_manual(&self) -> Option<Tick> {
        self.dispatcher.dispatch(TickKind::Manual).await
    }

    /// Cancel the periodic timer. Cycles already in flight keep running.
    /// Returns `Ok(true)` only for the call that cancelled a live timer.
    pub async fn stop(&mut self) -> Result<bool> {
        let Some(token) = self.cancel_token.take() else {
            return Ok(false);
        };
        token.cancel();

        if let Some(handle) = self.ticker.take() {
            handle.await.context("capture timer task failed to join")?;
        }
        Ok(true)
    }

    pub fn is_running(&self) -> bool {
        self.cancel_token.is_some()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn dispatcher(&self) -> &Dispatcher<R> {
        &self.dispatcher
    }
}

impl<R: CycleRunner> Drop for CaptureScheduler<R> {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}
