use super::CaptureSource;
use crate::error::{CaptureError, Result};
use crate::frame::{Captured, Stream};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::{Buffer, Camera};

/// RGB-convertible stream at the highest resolution the camera offers.
pub struct MainStreamCapture {
    camera: Camera,
    width: u32,
    height: u32,
    started: bool,
}

impl MainStreamCapture {
    pub fn open(device_index: u32) -> Result<Self> {
        tracing::info!("Opening camera {} main stream", device_index);

        let index = CameraIndex::Index(device_index);
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);

        let camera = Camera::new(index, requested).map_err(|e| {
            CaptureError::DeviceUnavailable(format!("camera {device_index}: {e}"))
        })?;

        let resolution = camera.resolution();
        tracing::info!(
            "Main stream configured at {}x{} ({:?})",
            resolution.width(),
            resolution.height(),
            camera.frame_format()
        );

        Ok(Self {
            camera,
            width: resolution.width(),
            height: resolution.height(),
            started: false,
        })
    }

    fn next_buffer(&mut self) -> Result<Buffer> {
        if !self.started {
            return Err(CaptureError::CaptureFailure(
                "main stream not started".to_string(),
            ));
        }

        self.camera
            .frame()
            .map_err(|e| CaptureError::CaptureFailure(format!("main stream: {e}")))
    }
}

/// Decode a dequeued main-stream buffer into RGB.
fn decode_main(frame: &Buffer) -> Result<RgbImage> {
    if frame.buffer().is_empty() {
        return Err(CaptureError::CaptureFailure(
            "main stream returned an empty buffer".to_string(),
        ));
    }

    let decoded = frame
        .decode_image::<RgbFormat>()
        .map_err(|e| CaptureError::EncodingFailure(format!("RGB decode: {e}")))?;

    let (width, height) = decoded.dimensions();
    RgbImage::from_raw(width, height, decoded.into_raw()).ok_or_else(|| {
        CaptureError::EncodingFailure(format!("RGB buffer does not fit {width}x{height}"))
    })
}

impl CaptureSource for MainStreamCapture {
    fn stream(&self) -> Stream {
        Stream::Main
    }

    fn sensor_resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn start(&mut self) -> Result<()> {
        self.camera
            .open_stream()
            .map_err(|e| CaptureError::DeviceUnavailable(format!("open main stream: {e}")))?;
        self.started = true;
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        self.next_buffer().map(drop)
    }

    fn capture(&mut self) -> Result<Captured> {
        let frame = self.next_buffer()?;
        decode_main(&frame).map(Captured::Rgb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nokhwa::utils::{FrameFormat, Resolution};

    #[test]
    fn neutral_yuyv_decodes_to_rgb() {
        let frame = Buffer::new(Resolution::new(2, 2), &[128u8; 8], FrameFormat::YUYV);
        let image = decode_main(&frame).unwrap();
        assert_eq!(image.dimensions(), (2, 2));
    }

    #[test]
    fn empty_buffer_is_capture_failure() {
        let frame = Buffer::new(Resolution::new(2, 2), &[], FrameFormat::YUYV);
        assert!(matches!(
            decode_main(&frame),
            Err(CaptureError::CaptureFailure(_))
        ));
    }

    #[test]
    fn truncated_buffer_is_encoding_failure() {
        let frame = Buffer::new(Resolution::new(4, 4), &[128u8; 6], FrameFormat::YUYV);
        assert!(matches!(
            decode_main(&frame),
            Err(CaptureError::EncodingFailure(_))
        ));
    }
}
