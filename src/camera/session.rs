use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use chrono::{DateTime, Utc};
use log::info;
use tokio::sync::watch;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::CameraError;

use super::{CameraBackend, CameraStream, StreamConstraints};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadyPhase {
    Pending,
    Ready,
    Released,
}

/// An acquired camera stream plus its one-shot ready signal.
///
/// Shared between the controller (which releases it) and capture cycles
/// (which sample it). Once released, `source()` yields nothing and no
/// further capture is possible.
pub struct CameraSession {
    id: Uuid,
    opened_at: DateTime<Utc>,
    backend: &'static str,
    active: AtomicBool,
    stream: Mutex<Option<Arc<dyn CameraStream>>>,
    ready_tx: Arc<watch::Sender<ReadyPhase>>,
    ready_rx: watch::Receiver<ReadyPhase>,
    watcher_cancel: CancellationToken,
}

impl CameraSession {
    /// Open the device on a blocking worker and start watching for readiness.
    ///
    /// Permission and device failures propagate unchanged so the caller can
    /// report them.
    pub async fn acquire(
        backend: Arc<dyn CameraBackend>,
        constraints: StreamConstraints,
        ready_poll: Duration,
    ) -> Result<Arc<Self>, CameraError> {
        let backend_name = backend.name();
        let stream = tokio::task::spawn_blocking(move || backend.open(&constraints))
            .await
            .map_err(|err| CameraError::DeviceUnavailable(format!("camera open worker failed: {err}")))??;

        let session = Arc::new(Self::from_stream(stream, backend_name));
        session.spawn_ready_watcher(ready_poll);

        info!(
            "camera session {} acquired via {} backend",
            session.id, session.backend
        );
        Ok(session)
    }

    fn from_stream(stream: Arc<dyn CameraStream>, backend: &'static str) -> Self {
        let (ready_tx, ready_rx) = watch::channel(ReadyPhase::Pending);
        Self {
            id: Uuid::new_v4(),
            opened_at: Utc::now(),
            backend,
            active: AtomicBool::new(true),
            stream: Mutex::new(Some(stream)),
            ready_tx: Arc::new(ready_tx),
            ready_rx,
            watcher_cancel: CancellationToken::new(),
        }
    }

    fn spawn_ready_watcher(&self, poll: Duration) {
        let Some(stream) = self.stream_handle() else {
            return;
        };
        let ready_tx = Arc::clone(&self.ready_tx);
        let cancel = self.watcher_cancel.clone();
        let session_id = self.id;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if stream.ready_state().has_metadata() {
                            let fired = ready_tx.send_if_modified(|phase| {
                                if *phase == ReadyPhase::Pending {
                                    *phase = ReadyPhase::Ready;
                                    true
                                } else {
                                    false
                                }
                            });
                            if fired {
                                let (w, h) = stream.dimensions();
                                log_info!("camera session {} ready ({}x{})", session_id, w, h);
                            }
                            break;
                        }
                    }
                    _ = cancel.cancelled() => {
                        log_debug!("ready watcher for session {} cancelled", session_id);
                        break;
                    }
                }
            }
        });
    }

    /// Resolves once the source has usable metadata. Fires at most once;
    /// later callers resolve immediately. Fails if the session is released
    /// first.
    pub async fn wait_ready(&self) -> Result<(), CameraError> {
        let mut rx = self.ready_rx.clone();
        let phase = rx
            .wait_for(|phase| *phase != ReadyPhase::Pending)
            .await
            .map(|phase| *phase)
            .map_err(|_| CameraError::Released)?;

        match phase {
            ReadyPhase::Ready if self.is_active() => Ok(()),
            _ => Err(CameraError::Released),
        }
    }

    /// Stop all device tracks. Returns `true` only for the call that actually
    /// released the stream.
    pub fn release(&self) -> bool {
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }

        self.watcher_cancel.cancel();
        self.ready_tx.send_replace(ReadyPhase::Released);

        let stream = match self.stream.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(stream) = stream {
            stream.stop_tracks();
        }

        info!("camera session {} released", self.id);
        true
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        *self.ready_rx.borrow() == ReadyPhase::Ready && self.is_active()
    }

    /// The live source, or `None` after release.
    pub fn source(&self) -> Option<Arc<dyn CameraStream>> {
        self.stream_handle()
    }

    fn stream_handle(&self) -> Option<Arc<dyn CameraStream>> {
        if !self.is_active() {
            return None;
        }
        match self.stream.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.release();
    }
}
