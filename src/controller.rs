use std::sync::{atomic::AtomicU64, Arc};

use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::analysis::Analyzer;
use crate::camera::{CameraBackend, CameraSession, StreamConstraints};
use crate::capture::{AnalysisCycle, CaptureScheduler, Dispatcher, Tick};
use crate::display::{DisplayState, DisplayStore};
use crate::encoder::FrameEncoder;
use crate::error::ControllerError;
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::settings::Settings;

type Scheduler<A> = CaptureScheduler<AnalysisCycle<A>>;

/// One start..stop span: the camera session and the scheduler bound to it.
struct ActiveRun<A: Analyzer> {
    id: Uuid,
    session: Arc<CameraSession>,
    scheduler: Arc<Mutex<Scheduler<A>>>,
    arm_token: CancellationToken,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraStatus {
    pub session_id: Uuid,
    pub backend: &'static str,
    pub ready: bool,
    pub capturing: bool,
}

/// Owns the capture lifecycle: camera, scheduler and display state.
pub struct AppController<A: Analyzer> {
    backend: Arc<dyn CameraBackend>,
    analyzer: Arc<A>,
    settings: Arc<Settings>,
    display: DisplayStore,
    metrics: MetricsCollector,
    /// Tick numbering shared by every run, so `applied_seq` stays comparable
    /// across restarts.
    next_seq: Arc<AtomicU64>,
    run: Arc<Mutex<Option<ActiveRun<A>>>>,
}

impl<A: Analyzer> Clone for AppController<A> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            analyzer: Arc::clone(&self.analyzer),
            settings: Arc::clone(&self.settings),
            display: self.display.clone(),
            metrics: self.metrics.clone(),
            next_seq: Arc::clone(&self.next_seq),
            run: Arc::clone(&self.run),
        }
    }
}

impl<A: Analyzer> AppController<A> {
    pub fn new(backend: Arc<dyn CameraBackend>, analyzer: Arc<A>, settings: Settings) -> Self {
        let display = DisplayStore::new(settings.capture.freshness);
        Self {
            backend,
            analyzer,
            settings: Arc::new(settings),
            display,
            metrics: MetricsCollector::new(),
            next_seq: Arc::new(AtomicU64::new(0)),
            run: Arc::new(Mutex::new(None)),
        }
    }

    /// Acquire the camera and arm capture once it is ready.
    ///
    /// Camera failures are returned to the caller and leave everything
    /// stopped; the scheduler is never started without a session.
    pub async fn start(&self) -> Result<(), ControllerError> {
        let mut run = self.run.lock().await;
        if run.is_some() {
            return Err(ControllerError::AlreadyRunning);
        }

        let constraints = StreamConstraints {
            device_index: self.settings.camera.device_index,
            audio: false,
        };
        let session = CameraSession::acquire(
            Arc::clone(&self.backend),
            constraints,
            self.settings.camera.ready_poll(),
        )
        .await
        .map_err(|err| {
            error!("camera start error: {err}");
            err
        })?;

        let capture = &self.settings.capture;
        let cycle = AnalysisCycle::new(
            Arc::clone(&session),
            Arc::clone(&self.analyzer),
            FrameEncoder::new(capture.encode_options()),
            self.display.clone(),
            self.metrics.clone(),
            self.settings.analysis.text.clone(),
        );
        let dispatcher = Dispatcher::new(Arc::new(cycle), capture.max_in_flight, self.metrics.clone())
            .with_sequence(Arc::clone(&self.next_seq));
        let scheduler = Arc::new(Mutex::new(CaptureScheduler::new(dispatcher, capture.interval())));

        let active = ActiveRun {
            id: Uuid::new_v4(),
            session,
            scheduler,
            arm_token: CancellationToken::new(),
        };
        self.spawn_arming(&active);

        info!("capture run {} started (camera {})", active.id, active.session.id());
        *run = Some(active);
        self.display.set_running(true);
        Ok(())
    }

    /// Start the scheduler once the session reports ready, unless the run is
    /// torn down first.
    fn spawn_arming(&self, active: &ActiveRun<A>) {
        let session = Arc::clone(&active.session);
        let scheduler = Arc::clone(&active.scheduler);
        let token = active.arm_token.clone();
        let display = self.display.clone();
        let run_id = active.id;

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                ready = session.wait_ready() => {
                    if ready.is_err() {
                        return;
                    }
                }
            }

            let mut scheduler = scheduler.lock().await;
            if token.is_cancelled() {
                return;
            }
            scheduler.start().await;
            display.set_capturing(true);
            info!("capture run {} armed", run_id);
        });
    }

    /// Manual capture. Dispatched even before the camera is ready; the
    /// cycle waits on the same ready signal as the scheduler.
    pub async fn capture_now(&self) -> Option<Tick> {
        let scheduler = {
            let run = self.run.lock().await;
            match run.as_ref() {
                Some(active) => Arc::clone(&active.scheduler),
                None => {
                    info!("capture requested while stopped; ignoring");
                    return None;
                }
            }
        };

        let scheduler = scheduler.lock().await;
        scheduler.trigger_manual().await
    }

    /// Tear the run down: timer first, then the camera, then the running
    /// flag. Only the first call after a start does anything.
    pub async fn stop(&self) -> bool {
        let mut run = self.run.lock().await;
        let Some(active) = run.take() else {
            return false;
        };

        active.arm_token.cancel();

        {
            let mut scheduler = active.scheduler.lock().await;
            if let Err(err) = scheduler.stop().await {
                warn!("capture run {}: {err:?}", active.id);
            }
            self.display.set_capturing(false);
        }

        active.session.release();
        self.display.set_running(false);

        info!("capture run {} stopped", active.id);
        true
    }

    pub async fn is_running(&self) -> bool {
        self.run.lock().await.is_some()
    }

    /// Whether the periodic timer is armed (the camera became ready).
    pub fn is_capturing(&self) -> bool {
        self.display.snapshot().capturing
    }

    pub async fn camera_status(&self) -> Option<CameraStatus> {
        let run = self.run.lock().await;
        let session = &run.as_ref()?.session;

        Some(CameraStatus {
            session_id: session.id(),
            backend: session.backend(),
            ready: session.is_ready(),
            capturing: self.is_capturing(),
        })
    }

    pub fn display(&self) -> DisplayState {
        self.display.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<DisplayState> {
        self.display.subscribe()
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot().await
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
