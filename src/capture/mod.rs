#[cfg(feature = "rpicam")]
mod libcamera_stream;
mod main_stream;
mod raw_stream;

#[cfg(feature = "rpicam")]
pub use libcamera_stream::LibcameraCapture;
pub use main_stream::MainStreamCapture;
pub use raw_stream::RawStreamCapture;

use crate::config::{CaptureConfig, CaptureMode};
use crate::encode;
use crate::error::{CaptureError, Result};
use crate::frame::{Captured, Frame, FrameKind, Stream};
use std::time::{Duration, Instant};

/// Trait for camera capture sources
pub trait CaptureSource {
    /// The stream this source pulls from
    fn stream(&self) -> Stream;

    /// Resolution the source was configured at
    fn sensor_resolution(&self) -> (u32, u32);

    /// Start sensor streaming
    fn start(&mut self) -> Result<()>;

    /// Pull the next frame and drop it, handing its buffer back to the driver.
    fn discard(&mut self) -> Result<()>;

    /// Pull a single frame. Only valid after [`CaptureSource::start`].
    fn capture(&mut self) -> Result<Captured>;
}

/// Open the device and configure the stream the mode needs.
pub fn open_source(config: &CaptureConfig) -> Result<Box<dyn CaptureSource>> {
    let source: Box<dyn CaptureSource> = match config.mode() {
        #[cfg(feature = "rpicam")]
        CaptureMode::Encoded => Box::new(LibcameraCapture::open(config.device())?),
        #[cfg(not(feature = "rpicam"))]
        CaptureMode::Encoded => Box::new(MainStreamCapture::open(config.device())?),
        CaptureMode::Raw => Box::new(RawStreamCapture::open(config.device())?),
    };
    Ok(source)
}

/// Keep the stream flowing until `delay` has passed, dropping every frame.
///
/// Returns the number of frames dropped. Frames queued while nobody reads
/// would otherwise be handed out after the delay.
fn drain_during_delay(source: &mut dyn CaptureSource, delay: Duration) -> Result<usize> {
    let deadline = Instant::now() + delay;
    let mut dropped = 0;
    while Instant::now() < deadline {
        source.discard()?;
        dropped += 1;
    }
    Ok(dropped)
}

/// One-shot still capture: start, warm up, pull one frame, encode.
pub struct FrameCapture {
    config: CaptureConfig,
}

impl FrameCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, source: &mut dyn CaptureSource) -> Result<Frame> {
        let mode = self.config.mode();
        if source.stream() != mode.stream() {
            return Err(CaptureError::CaptureFailure(format!(
                "{:?} mode needs the {} stream, source provides {}",
                mode,
                mode.stream(),
                source.stream()
            )));
        }

        let (width, height) = source.sensor_resolution();
        tracing::info!("Starting {} stream at {}x{}", source.stream(), width, height);
        source.start()?;

        let warmup = self.config.warmup();
        if !warmup.is_zero() {
            tracing::debug!("Warming up for {:?}", warmup);
            let dropped = drain_during_delay(source, warmup)?;
            tracing::debug!("Dropped {} frames during warm-up", dropped);
        }

        let capture_start = Instant::now();
        let captured = source.capture()?;
        let (frame_width, frame_height) = captured.dimensions();
        tracing::info!(
            "Captured {}x{} frame ({} bytes) in {:.1}ms",
            frame_width,
            frame_height,
            captured.byte_len(),
            capture_start.elapsed().as_secs_f64() * 1000.0
        );

        let frame = match (mode, captured) {
            (CaptureMode::Encoded, Captured::Rgb(rgb)) => {
                let png = encode::encode_png(&rgb)?;
                if !png.starts_with(&encode::PNG_SIGNATURE) {
                    return Err(CaptureError::EncodingFailure(
                        "encoder output lacks PNG signature".to_string(),
                    ));
                }
                Frame::new(FrameKind::Png, png)
            }
            (CaptureMode::Encoded, Captured::Sensor(buffer)) => {
                return Err(CaptureError::EncodingFailure(format!(
                    "no RGB conversion for native format {}",
                    buffer.fourcc_str()
                )))
            }
            (CaptureMode::Raw, Captured::Sensor(buffer)) => Frame::new(
                FrameKind::Raw,
                encode::render_raw(&buffer.data, self.config.raw_encoding()),
            ),
            (CaptureMode::Raw, Captured::Rgb(_)) => {
                return Err(CaptureError::CaptureFailure(
                    "raw stream delivered converted RGB data".to_string(),
                ))
            }
        };

        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawEncoding;
    use crate::frame::PixelBuffer;
    use image::{Rgb, RgbImage};
    use std::collections::VecDeque;

    /// In-memory source modelled on a driver buffer ring.
    ///
    /// `stale` holds frames exposed right after streaming began; they are
    /// handed out first. After that every pull returns `live`.
    struct FakeSource {
        stream: Stream,
        stale: VecDeque<Captured>,
        live: Option<fn() -> Captured>,
        frame_interval: Duration,
        started: bool,
        discards: usize,
        captures: usize,
    }

    impl FakeSource {
        fn new(stream: Stream, live: fn() -> Captured) -> Self {
            Self {
                stream,
                stale: VecDeque::new(),
                live: Some(live),
                frame_interval: Duration::from_millis(1),
                started: false,
                discards: 0,
                captures: 0,
            }
        }

        fn pull(&mut self) -> Result<Captured> {
            if !self.started {
                return Err(CaptureError::CaptureFailure("not started".to_string()));
            }
            std::thread::sleep(self.frame_interval);
            if let Some(frame) = self.stale.pop_front() {
                return Ok(frame);
            }
            self.live
                .map(|live| live())
                .ok_or_else(|| CaptureError::CaptureFailure("no frame".to_string()))
        }
    }

    impl CaptureSource for FakeSource {
        fn stream(&self) -> Stream {
            self.stream
        }

        fn sensor_resolution(&self) -> (u32, u32) {
            (2, 2)
        }

        fn start(&mut self) -> Result<()> {
            self.started = true;
            Ok(())
        }

        fn discard(&mut self) -> Result<()> {
            self.discards += 1;
            self.pull().map(drop)
        }

        fn capture(&mut self) -> Result<Captured> {
            self.captures += 1;
            self.pull()
        }
    }

    fn config(mode: CaptureMode) -> CaptureConfig {
        CaptureConfig::default()
            .with_mode(mode)
            .with_warmup(Duration::ZERO)
    }

    fn gray() -> Captured {
        Captured::Rgb(RgbImage::from_pixel(2, 2, Rgb([128, 128, 128])))
    }

    fn sensor(value: u8) -> Captured {
        Captured::Sensor(PixelBuffer {
            width: 3,
            height: 1,
            fourcc: *b"pRAA",
            data: vec![value; 6],
        })
    }

    fn settled_sensor() -> Captured {
        sensor(0xee)
    }

    #[test]
    fn encoded_mode_emits_png() {
        let mut source = FakeSource::new(Stream::Main, gray);
        let frame = FrameCapture::new(config(CaptureMode::Encoded))
            .run(&mut source)
            .unwrap();

        assert_eq!(frame.kind(), FrameKind::Png);
        assert_eq!(frame.bytes()[..8], encode::PNG_SIGNATURE);
        assert!(source.started);
        assert_eq!(source.captures, 1);
    }

    #[test]
    fn raw_mode_emits_sensor_bytes_untouched() {
        fn sensor_bytes() -> Captured {
            Captured::Sensor(PixelBuffer {
                width: 3,
                height: 1,
                fourcc: *b"pRAA",
                data: vec![0x00, 0x10, 0xff, 0x0a, 0x7f, 0x80],
            })
        }

        let mut source = FakeSource::new(Stream::Raw, sensor_bytes);
        let frame = FrameCapture::new(config(CaptureMode::Raw))
            .run(&mut source)
            .unwrap();

        assert_eq!(frame.kind(), FrameKind::Raw);
        assert_eq!(frame.bytes(), &[0x00, 0x10, 0xff, 0x0a, 0x7f, 0x80]);
        assert_eq!(source.captures, 1);
    }

    #[test]
    fn raw_mode_can_render_escaped_text() {
        fn two_bytes() -> Captured {
            Captured::Sensor(PixelBuffer {
                width: 2,
                height: 1,
                fourcc: *b"pRAA",
                data: vec![0x01, b'A'],
            })
        }

        let mut source = FakeSource::new(Stream::Raw, two_bytes);
        let frame = FrameCapture::new(
            config(CaptureMode::Raw).with_raw_encoding(RawEncoding::Escaped),
        )
        .run(&mut source)
        .unwrap();

        assert_eq!(frame.bytes(), b"b'\\x01A'\n");
    }

    #[test]
    fn mismatched_stream_is_rejected_before_start() {
        let mut source = FakeSource::new(Stream::Raw, gray);
        let result = FrameCapture::new(config(CaptureMode::Encoded)).run(&mut source);

        assert!(matches!(result, Err(CaptureError::CaptureFailure(_))));
        assert!(!source.started);
    }

    #[test]
    fn native_frame_on_main_stream_is_encoding_failure() {
        let mut source = FakeSource::new(Stream::Main, settled_sensor);
        let result = FrameCapture::new(config(CaptureMode::Encoded)).run(&mut source);

        match result {
            Err(CaptureError::EncodingFailure(msg)) => assert!(msg.contains("pRAA")),
            other => panic!("expected EncodingFailure, got {other:?}"),
        }
    }

    #[test]
    fn capture_failure_propagates() {
        let mut source = FakeSource::new(Stream::Main, gray);
        source.live = None;
        let result = FrameCapture::new(config(CaptureMode::Encoded)).run(&mut source);

        assert!(matches!(result, Err(CaptureError::CaptureFailure(_))));
    }

    #[test]
    fn zero_warmup_pulls_exactly_one_frame() {
        let mut source = FakeSource::new(Stream::Main, gray);
        FrameCapture::new(config(CaptureMode::Encoded))
            .run(&mut source)
            .unwrap();

        assert_eq!(source.discards, 0);
        assert_eq!(source.captures, 1);
    }

    #[test]
    fn frames_queued_before_warmup_are_never_emitted() {
        let mut source = FakeSource::new(Stream::Raw, settled_sensor);
        source.frame_interval = Duration::from_millis(5);
        // Ring of buffers filled right after streaming began
        source.stale = (0..4).map(|_| sensor(0x01)).collect();

        let started = Instant::now();
        let frame = FrameCapture::new(
            config(CaptureMode::Raw).with_warmup(Duration::from_millis(60)),
        )
        .run(&mut source)
        .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(60));
        assert!(source.stale.is_empty());
        assert!(source.discards >= 4);
        assert_eq!(source.captures, 1);
        assert_eq!(frame.bytes(), &[0xee; 6]);
    }

    #[test]
    fn drain_error_is_fatal() {
        let mut source = FakeSource::new(Stream::Main, gray);
        source.live = None;
        let result = FrameCapture::new(
            config(CaptureMode::Encoded).with_warmup(Duration::from_millis(20)),
        )
        .run(&mut source);

        assert!(matches!(result, Err(CaptureError::CaptureFailure(_))));
        assert_eq!(source.captures, 0);
    }
}
