pub mod session;
pub mod synthetic;
#[cfg(feature = "webcam")]
pub mod webcam;

pub use session::CameraSession;
pub use synthetic::{SyntheticCamera, SyntheticConfig};

use std::sync::Arc;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::CameraError;

/// How far along a live source is, ordered the way media elements report it.
///
/// Encoding needs at least `HaveCurrentData`; the session ready signal fires
/// at `HaveMetadata`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadyState {
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

impl ReadyState {
    pub fn has_metadata(self) -> bool {
        self >= ReadyState::HaveMetadata
    }

    pub fn has_current_data(self) -> bool {
        self >= ReadyState::HaveCurrentData
    }
}

/// A live video source the encoder can sample.
pub trait VideoSource: Send + Sync {
    fn ready_state(&self) -> ReadyState;

    /// Intrinsic dimensions; `(0, 0)` until metadata is known.
    fn dimensions(&self) -> (u32, u32);

    /// Latest decoded frame, if any.
    fn current_frame(&self) -> Option<RgbImage>;
}

/// An open device stream. Stopping is idempotent.
pub trait CameraStream: VideoSource {
    fn stop_tracks(&self);

    fn is_live(&self) -> bool;
}

/// Requested capture constraints. Video only; audio is never requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub device_index: u32,
    pub audio: bool,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            device_index: 0,
            audio: false,
        }
    }
}

/// Platform media-device API. `open` may block on a permission prompt and is
/// always called from a blocking worker.
pub trait CameraBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn open(&self, constraints: &StreamConstraints) -> Result<Arc<dyn CameraStream>, CameraError>;
}
