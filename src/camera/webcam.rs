//! Webcam backend using `nokhwa`.
//!
//! `nokhwa::Camera` is `!Send`, so each stream owns a dedicated capture
//! thread that opens the device, publishes the latest decoded frame, and
//! stops the device when asked.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering},
    mpsc, Arc, Mutex,
};
use std::thread;
use std::time::Duration;

use image::RgbImage;
use log::{error, info, warn};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::{Camera, NokhwaError};

use crate::error::CameraError;

use super::{CameraBackend, CameraStream, ReadyState, StreamConstraints, VideoSource};

const FRAME_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
pub struct WebcamBackend;

impl WebcamBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CameraBackend for WebcamBackend {
    fn name(&self) -> &'static str {
        "webcam"
    }

    fn open(&self, constraints: &StreamConstraints) -> Result<Arc<dyn CameraStream>, CameraError> {
        let shared = Arc::new(Shared {
            ready: AtomicU8::new(ReadyState::HaveNothing as u8),
            width: AtomicU32::new(0),
            height: AtomicU32::new(0),
            frame: Mutex::new(None),
            stop: AtomicBool::new(false),
        });

        let (open_tx, open_rx) = mpsc::channel::<Result<(), CameraError>>();
        let device_index = constraints.device_index;
        let worker_shared = Arc::clone(&shared);

        let worker = thread::Builder::new()
            .name(format!("webcam-{device_index}"))
            .spawn(move || capture_thread(device_index, worker_shared, open_tx))
            .map_err(|err| CameraError::DeviceUnavailable(format!("failed to spawn capture thread: {err}")))?;

        match open_rx.recv() {
            // The capture thread is detached; it exits on its own once the
            // stop flag is set, so release never blocks on the device.
            Ok(Ok(())) => Ok(Arc::new(WebcamStream { shared })),
            Ok(Err(err)) => {
                let _ = worker.join();
                Err(err)
            }
            Err(_) => {
                let _ = worker.join();
                Err(CameraError::DeviceUnavailable("capture thread exited during open".into()))
            }
        }
    }
}

struct Shared {
    ready: AtomicU8,
    width: AtomicU32,
    height: AtomicU32,
    frame: Mutex<Option<RgbImage>>,
    stop: AtomicBool,
}

impl Shared {
    fn set_ready(&self, state: ReadyState) {
        self.ready.fetch_max(state as u8, Ordering::SeqCst);
    }
}

fn capture_thread(
    device_index: u32,
    shared: Arc<Shared>,
    open_tx: mpsc::Sender<Result<(), CameraError>>,
) {
    let requested =
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

    let mut camera = match Camera::new(CameraIndex::Index(device_index), requested) {
        Ok(camera) => camera,
        Err(err) => {
            let _ = open_tx.send(Err(classify(err)));
            return;
        }
    };

    if let Err(err) = camera.open_stream() {
        let _ = open_tx.send(Err(classify(err)));
        return;
    }

    let resolution = camera.resolution();
    shared.width.store(resolution.width_x, Ordering::SeqCst);
    shared.height.store(resolution.height_y, Ordering::SeqCst);
    shared.set_ready(ReadyState::HaveMetadata);
    info!(
        "webcam {} streaming at {}x{}",
        device_index, resolution.width_x, resolution.height_y
    );
    let _ = open_tx.send(Ok(()));

    while !shared.stop.load(Ordering::SeqCst) {
        let decoded = camera
            .frame()
            .and_then(|buffer| buffer.decode_image::<RgbFormat>());

        match decoded {
            Ok(decoded) => {
                let (width, height) = (decoded.width(), decoded.height());
                let Some(frame) = RgbImage::from_raw(width, height, decoded.into_raw()) else {
                    warn!("webcam {} produced a short frame buffer", device_index);
                    continue;
                };
                if let Ok(mut slot) = shared.frame.lock() {
                    *slot = Some(frame);
                }
                shared.set_ready(ReadyState::HaveEnoughData);
            }
            Err(err) => {
                warn!("webcam {} frame capture failed: {}", device_index, err);
                thread::sleep(FRAME_RETRY_DELAY);
            }
        }
    }

    if let Err(err) = camera.stop_stream() {
        error!("webcam {} failed to stop stream: {}", device_index, err);
    }
    info!("webcam {} capture thread stopped", device_index);
}

fn classify(err: NokhwaError) -> CameraError {
    classify_message(err.to_string())
}

fn classify_message(message: String) -> CameraError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("authoriz") {
        CameraError::PermissionDenied(message)
    } else {
        CameraError::DeviceUnavailable(message)
    }
}

struct WebcamStream {
    shared: Arc<Shared>,
}

impl VideoSource for WebcamStream {
    fn ready_state(&self) -> ReadyState {
        if self.shared.stop.load(Ordering::SeqCst) {
            return ReadyState::HaveNothing;
        }
        match self.shared.ready.load(Ordering::SeqCst) {
            0 => ReadyState::HaveNothing,
            1 => ReadyState::HaveMetadata,
            2 => ReadyState::HaveCurrentData,
            3 => ReadyState::HaveFutureData,
            _ => ReadyState::HaveEnoughData,
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        (
            self.shared.width.load(Ordering::SeqCst),
            self.shared.height.load(Ordering::SeqCst),
        )
    }

    fn current_frame(&self) -> Option<RgbImage> {
        self.shared.frame.lock().ok().and_then(|slot| slot.clone())
    }
}

impl CameraStream for WebcamStream {
    fn stop_tracks(&self) {
        if !self.shared.stop.swap(true, Ordering::SeqCst) {
            info!("webcam stop requested");
        }
    }

    fn is_live(&self) -> bool {
        !self.shared.stop.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backend_is_the_webcam() {
        assert_eq!(WebcamBackend::default().name(), "webcam");
    }

    #[test]
    fn permission_messages_map_to_denied() {
        assert!(matches!(
            classify_message("Camera access denied by user".into()),
            CameraError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_message("no device at index 3".into()),
            CameraError::DeviceUnavailable(_)
        ));
    }
}
