use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::camera::VideoSource;
use crate::error::EncodeError;

pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 480;
pub const DEFAULT_QUALITY: f32 = 0.6;
pub const JPEG_MIME: &str = "image/jpeg";

/// A still frame ready for submission. Raw JPEG bytes, no data-URI prefix.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub quality: f32,
    pub width: u32,
    pub height: u32,
}

impl EncodedFrame {
    /// Standard base64 of the JPEG payload, as the analysis service expects it.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeOptions {
    /// Overrides the source width; otherwise the source's, or 640 if it reports 0.
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Clamped to `[0, 1]`.
    pub quality: f32,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            quality: DEFAULT_QUALITY,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameEncoder {
    options: EncodeOptions,
}

impl FrameEncoder {
    pub fn new(options: EncodeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> EncodeOptions {
        self.options
    }

    pub fn encode<S>(&self, source: &S) -> Result<EncodedFrame, EncodeError>
    where
        S: VideoSource + ?Sized,
    {
        encode(source, self.options)
    }
}

/// Draw the current frame of `source` onto a canvas and JPEG-encode it.
///
/// Sources below the current-data stage are rejected before any pixel work,
/// independently of the session ready signal.
pub fn encode<S>(source: &S, options: EncodeOptions) -> Result<EncodedFrame, EncodeError>
where
    S: VideoSource + ?Sized,
{
    if !source.ready_state().has_current_data() {
        return Err(EncodeError::NotReady);
    }

    let (width, height) = canvas_size(source.dimensions(), &options);
    let canvas = draw(source.current_frame(), width, height);

    let quality = options.quality.clamp(0.0, 1.0);
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, jpeg_quality(quality)).encode_image(&canvas)?;

    Ok(EncodedFrame {
        bytes,
        mime_type: JPEG_MIME,
        quality,
        width,
        height,
    })
}

fn canvas_size((source_w, source_h): (u32, u32), options: &EncodeOptions) -> (u32, u32) {
    let pick = |explicit: Option<u32>, reported: u32, fallback: u32| {
        explicit
            .filter(|v| *v > 0)
            .or(Some(reported).filter(|v| *v > 0))
            .unwrap_or(fallback)
    };
    (
        pick(options.width, source_w, DEFAULT_WIDTH),
        pick(options.height, source_h, DEFAULT_HEIGHT),
    )
}

fn draw(frame: Option<RgbImage>, width: u32, height: u32) -> RgbImage {
    match frame {
        Some(frame) if frame.dimensions() == (width, height) => frame,
        Some(frame) => imageops::resize(&frame, width, height, FilterType::Triangle),
        None => RgbImage::new(width, height),
    }
}

/// Map a `[0, 1]` quality onto the codec's `1..=100` scale.
fn jpeg_quality(quality: f32) -> u8 {
    ((quality * 100.0).round() as u8).clamp(1, 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::ReadyState;
    use image::Rgb;

    struct FixedSource {
        state: ReadyState,
        dims: (u32, u32),
        frame: Option<RgbImage>,
    }

    impl VideoSource for FixedSource {
        fn ready_state(&self) -> ReadyState {
            self.state
        }

        fn dimensions(&self) -> (u32, u32) {
            self.dims
        }

        fn current_frame(&self) -> Option<RgbImage> {
            self.frame.clone()
        }
    }

    fn decoded_size(frame: &EncodedFrame) -> (u32, u32) {
        let img = image::load_from_memory_with_format(&frame.bytes, image::ImageFormat::Jpeg)
            .unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn below_threshold_is_not_ready() {
        for state in [ReadyState::HaveNothing, ReadyState::HaveMetadata] {
            let source = FixedSource {
                state,
                dims: (320, 240),
                frame: Some(RgbImage::new(320, 240)),
            };
            let result = FrameEncoder::default().encode(&source);
            assert!(matches!(result, Err(EncodeError::NotReady)));
        }
    }

    #[test]
    fn zero_dimensions_fall_back_to_vga() {
        let source = FixedSource {
            state: ReadyState::HaveCurrentData,
            dims: (0, 0),
            frame: None,
        };
        let frame = FrameEncoder::default().encode(&source).unwrap();

        assert_eq!((frame.width, frame.height), (640, 480));
        assert_eq!(decoded_size(&frame), (640, 480));
    }

    #[test]
    fn source_dimensions_are_used_and_frame_scaled() {
        let source = FixedSource {
            state: ReadyState::HaveEnoughData,
            dims: (320, 240),
            frame: Some(RgbImage::from_pixel(64, 48, Rgb([200, 10, 10]))),
        };
        let frame = FrameEncoder::default().encode(&source).unwrap();

        assert_eq!(decoded_size(&frame), (320, 240));
        assert_eq!(frame.mime_type, "image/jpeg");
        assert!((frame.quality - 0.6).abs() < f32::EPSILON);
    }

    #[test]
    fn base64_payload_has_no_data_uri_prefix() {
        let source = FixedSource {
            state: ReadyState::HaveEnoughData,
            dims: (32, 32),
            frame: Some(RgbImage::new(32, 32)),
        };
        let frame = FrameEncoder::default().encode(&source).unwrap();
        let payload = frame.to_base64();

        assert!(!payload.starts_with("data:"));
        assert!(!payload.contains(','));
        let raw = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .unwrap();
        assert_eq!(raw, frame.bytes);
        // JPEG SOI marker.
        assert_eq!(&raw[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn quality_maps_onto_codec_scale() {
        assert_eq!(jpeg_quality(0.6), 60);
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(1.0), 100);
    }
}
