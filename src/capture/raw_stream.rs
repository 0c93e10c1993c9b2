use super::CaptureSource;
use crate::error::{CaptureError, Result};
use crate::frame::{Captured, PixelBuffer, Stream};
use v4l::buffer::Type;
use v4l::framesize::FrameSizeEnum;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format};

const BUFFER_COUNT: u32 = 4;

/// Native sensor data at the full sensor resolution, read straight from V4L2.
pub struct RawStreamCapture {
    device: Device,
    format: Format,
    stream: Option<MmapStream<'static>>,
}

impl RawStreamCapture {
    pub fn open(device_index: u32) -> Result<Self> {
        let path = format!("/dev/video{device_index}");
        tracing::info!("Opening {} raw stream", path);

        let device = Device::new(device_index as usize)
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{path}: {e}")))?;

        // Keep the sensor's native pixel format, only widen the frame size
        let native = device
            .format()
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{path}: query format: {e}")))?;

        let (width, height) = match device.enum_framesizes(native.fourcc) {
            Ok(sizes) => {
                let candidates: Vec<(u32, u32)> = sizes
                    .into_iter()
                    .map(|size| match size.size {
                        FrameSizeEnum::Discrete(d) => (d.width, d.height),
                        FrameSizeEnum::Stepwise(s) => (s.max_width, s.max_height),
                    })
                    .collect();
                largest_frame_size(&candidates).unwrap_or((native.width, native.height))
            }
            Err(e) => {
                tracing::debug!("Frame size enumeration unavailable ({}), keeping current", e);
                (native.width, native.height)
            }
        };

        let format = device
            .set_format(&Format::new(width, height, native.fourcc))
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{path}: set format: {e}")))?;

        if format.fourcc != native.fourcc {
            tracing::warn!(
                "Driver replaced native format {} with {}",
                native.fourcc,
                format.fourcc
            );
        }

        tracing::info!(
            "Raw stream configured at {}x{} ({})",
            format.width,
            format.height,
            format.fourcc
        );

        Ok(Self {
            device,
            format,
            stream: None,
        })
    }
}

/// Pick the candidate with the largest pixel area.
fn largest_frame_size(candidates: &[(u32, u32)]) -> Option<(u32, u32)> {
    candidates
        .iter()
        .copied()
        .max_by_key(|&(w, h)| u64::from(w) * u64::from(h))
}

impl CaptureSource for RawStreamCapture {
    fn stream(&self) -> Stream {
        Stream::Raw
    }

    fn sensor_resolution(&self) -> (u32, u32) {
        (self.format.width, self.format.height)
    }

    fn start(&mut self) -> Result<()> {
        let mut stream = MmapStream::with_buffers(&self.device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| CaptureError::DeviceUnavailable(format!("map raw buffers: {e}")))?;

        // V4L2 streaming only begins on the first dequeue
        stream
            .next()
            .map_err(|e| CaptureError::DeviceUnavailable(format!("start raw stream: {e}")))?;

        self.stream = Some(stream);
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| CaptureError::CaptureFailure("raw stream not started".to_string()))?;

        stream
            .next()
            .map(drop)
            .map_err(|e| CaptureError::CaptureFailure(format!("raw stream: {e}")))
    }

    fn capture(&mut self) -> Result<Captured> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| CaptureError::CaptureFailure("raw stream not started".to_string()))?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CaptureError::CaptureFailure(format!("raw stream: {e}")))?;

        sensor_buffer(buf, meta.bytesused, &self.format).map(Captured::Sensor)
    }
}

/// Copy the used part of a dequeued buffer before it goes back to the driver.
fn sensor_buffer(buf: &[u8], bytesused: u32, format: &Format) -> Result<PixelBuffer> {
    let used = (bytesused as usize).min(buf.len());
    if used == 0 {
        return Err(CaptureError::CaptureFailure(
            "raw stream returned an empty buffer".to_string(),
        ));
    }

    Ok(PixelBuffer {
        width: format.width,
        height: format.height,
        fourcc: format.fourcc.repr,
        data: buf[..used].to_vec(),
    })
}
