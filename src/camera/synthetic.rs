//! Test-pattern camera. Used when no hardware backend is compiled in, and by
//! the tests to script permission failures and slow warm-ups.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};
use rand::Rng;

use crate::error::CameraError;

use super::{CameraBackend, CameraStream, ReadyState, StreamConstraints, VideoSource};

const GRAIN: u8 = 12;

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Reported frame size; `0` simulates a source without dimensions.
    pub width: u32,
    pub height: u32,
    /// Metadata arrives halfway through the warm-up, frame data at the end.
    pub warmup: Duration,
    pub deny_permission: bool,
    pub unavailable: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            warmup: Duration::ZERO,
            deny_permission: false,
            unavailable: false,
        }
    }
}

#[derive(Clone)]
pub struct SyntheticCamera {
    config: SyntheticConfig,
    live: Arc<AtomicUsize>,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Streams opened and not yet stopped.
    pub fn live_streams(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl CameraBackend for SyntheticCamera {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn open(&self, constraints: &StreamConstraints) -> Result<Arc<dyn CameraStream>, CameraError> {
        if self.config.deny_permission {
            return Err(CameraError::PermissionDenied(
                "synthetic camera configured to deny access".into(),
            ));
        }
        if self.config.unavailable {
            return Err(CameraError::DeviceUnavailable(format!(
                "no synthetic device at index {}",
                constraints.device_index
            )));
        }

        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(SyntheticStream {
            config: self.config.clone(),
            opened_at: Instant::now(),
            stopped: AtomicBool::new(false),
            frames: AtomicU64::new(0),
            live: Arc::clone(&self.live),
        }))
    }
}

struct SyntheticStream {
    config: SyntheticConfig,
    opened_at: Instant,
    stopped: AtomicBool,
    frames: AtomicU64,
    live: Arc<AtomicUsize>,
}

impl VideoSource for SyntheticStream {
    fn ready_state(&self) -> ReadyState {
        if self.stopped.load(Ordering::SeqCst) {
            return ReadyState::HaveNothing;
        }

        let elapsed = self.opened_at.elapsed();
        if elapsed >= self.config.warmup {
            ReadyState::HaveEnoughData
        } else if elapsed >= self.config.warmup / 2 {
            ReadyState::HaveMetadata
        } else {
            ReadyState::HaveNothing
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        if self.ready_state().has_metadata() {
            (self.config.width, self.config.height)
        } else {
            (0, 0)
        }
    }

    fn current_frame(&self) -> Option<RgbImage> {
        let (width, height) = self.dimensions();
        if !self.ready_state().has_current_data() || width == 0 || height == 0 {
            return None;
        }

        let frame_no = self.frames.fetch_add(1, Ordering::Relaxed);
        Some(test_pattern(width, height, frame_no))
    }
}

impl CameraStream for SyntheticStream {
    fn stop_tracks(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }
}

/// Diagonal gradient with a bar that sweeps one step per frame, plus sensor
/// grain so consecutive frames never encode identically.
fn test_pattern(width: u32, height: u32, frame_no: u64) -> RgbImage {
    let mut rng = rand::thread_rng();
    let bar_x = (frame_no.wrapping_mul(16) % u64::from(width)) as u32;

    RgbImage::from_fn(width, height, |x, y| {
        if x.abs_diff(bar_x) < 8 {
            return Rgb([240, 240, 240]);
        }
        let grain = rng.gen_range(0..GRAIN);
        let r = ((x * 255) / width.max(1)) as u8;
        let g = ((y * 255) / height.max(1)) as u8;
        let b = (((x + y) * 255) / (width + height).max(1)) as u8;
        Rgb([r.saturating_add(grain), g.saturating_add(grain), b.saturating_add(grain)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_warmup_is_immediately_ready() {
        let camera = SyntheticCamera::new(SyntheticConfig::default());
        let stream = camera.open(&StreamConstraints::default()).unwrap();

        assert_eq!(stream.ready_state(), ReadyState::HaveEnoughData);
        assert_eq!(stream.dimensions(), (640, 480));
        let frame = stream.current_frame().unwrap();
        assert_eq!(frame.dimensions(), (640, 480));
    }

    #[test]
    fn stopped_stream_has_nothing() {
        let camera = SyntheticCamera::new(SyntheticConfig::default());
        let stream = camera.open(&StreamConstraints::default()).unwrap();
        stream.stop_tracks();
        stream.stop_tracks();

        assert_eq!(camera.live_streams(), 0);
        assert!(!stream.is_live());
        assert_eq!(stream.ready_state(), ReadyState::HaveNothing);
        assert!(stream.current_frame().is_none());
    }

    #[test]
    fn unavailable_device_fails_open() {
        let camera = SyntheticCamera::new(SyntheticConfig {
            unavailable: true,
            ..SyntheticConfig::default()
        });
        let err = camera.open(&StreamConstraints::default()).err().unwrap();
        assert!(matches!(err, CameraError::DeviceUnavailable(_)));
    }
}
