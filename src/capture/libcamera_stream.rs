use super::CaptureSource;
use crate::error::{CaptureError, Result};
use crate::frame::{Captured, Stream};
use image::RgbImage;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};

type FrameResult = Result<RgbImage>;

const BUFFER_COUNT: usize = 4;

/// libcamera `BGR888` stores pixels as R, G, B in memory.
const RGB_FOURCC: [u8; 4] = *b"BG24";

/// Main stream through libcamera, for sensors whose V4L2 node only exposes Bayer data.
///
/// The camera is released after configuration is validated in `open()` and
/// re-acquired by the session thread on `start()`. libcamera completes
/// requests on its own thread, so frames are forwarded over a bounded channel.
pub struct LibcameraCapture {
    index: usize,
    width: u32,
    height: u32,
    receiver: Option<Receiver<FrameResult>>,
    session: Option<JoinHandle<()>>,
}

impl LibcameraCapture {
    pub fn open(device_index: u32) -> Result<Self> {
        use libcamera::{
            camera_manager::CameraManager, pixel_format::PixelFormat, stream::StreamRole,
        };

        let index = device_index as usize;
        tracing::info!("Opening libcamera camera {} main stream", index);

        let mgr = CameraManager::new().map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
        let cameras = mgr.cameras();
        let cam = cameras
            .get(index)
            .ok_or_else(|| CaptureError::DeviceUnavailable(format!("no camera at index {index}")))?;
        let cam = cam
            .acquire()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        // Still-capture configurations default to the full sensor resolution
        let mut cfgs = cam
            .generate_configuration(&[StreamRole::StillCapture])
            .ok_or_else(|| CaptureError::DeviceUnavailable("no still configuration".to_string()))?;
        let rgb = PixelFormat::new(u32::from_le_bytes(RGB_FOURCC), 0);

        let no_stream_cfg =
            || CaptureError::DeviceUnavailable("no stream configuration".to_string());
        cfgs.get_mut(0).ok_or_else(no_stream_cfg)?.set_pixel_format(rgb);

        let status = cfgs.validate();
        let stream_cfg = cfgs.get(0).ok_or_else(no_stream_cfg)?;
        if status.is_invalid() || stream_cfg.get_pixel_format() != rgb {
            return Err(CaptureError::DeviceUnavailable(
                "camera cannot deliver BGR888 on the main stream".to_string(),
            ));
        }

        let size = stream_cfg.get_size();
        tracing::info!("Main stream configured at {}x{}", size.width, size.height);

        Ok(Self {
            index,
            width: size.width,
            height: size.height,
            receiver: None,
            session: None,
        })
    }

    fn recv(&mut self) -> FrameResult {
        let receiver = self
            .receiver
            .as_ref()
            .ok_or_else(|| CaptureError::CaptureFailure("main stream not started".to_string()))?;

        receiver.recv().map_err(|_| {
            CaptureError::CaptureFailure("libcamera session ended".to_string())
        })?
    }
}

impl CaptureSource for LibcameraCapture {
    fn stream(&self) -> Stream {
        Stream::Main
    }

    fn sensor_resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn start(&mut self) -> Result<()> {
        let (tx, rx) = mpsc::sync_channel(BUFFER_COUNT);
        let (index, width, height) = (self.index, self.width, self.height);

        let handle = thread::spawn(move || {
            if let Err(e) = run_session(index, width, height, &tx) {
                let _ = tx.send(Err(e));
            }
        });

        self.receiver = Some(rx);
        self.session = Some(handle);
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        self.recv().map(drop)
    }

    fn capture(&mut self) -> Result<Captured> {
        self.recv().map(Captured::Rgb)
    }
}

impl Drop for LibcameraCapture {
    fn drop(&mut self) {
        // Dropping the receiver makes the session thread exit on its next send
        drop(self.receiver.take());

        if let Some(handle) = self.session.take() {
            let _ = handle.join();
        }
    }
}

fn run_session(index: usize, width: u32, height: u32, tx: &SyncSender<FrameResult>) -> Result<()> {
    use libcamera::{
        camera_manager::CameraManager,
        framebuffer_allocator::FrameBufferAllocator,
        framebuffer_map::MemoryMappedFrameBuffer,
        pixel_format::PixelFormat,
        stream::StreamRole,
    };

    let device = |e: String| CaptureError::DeviceUnavailable(e);

    let mgr = CameraManager::new().map_err(|e| device(e.to_string()))?;
    let cameras = mgr.cameras();
    let cam = cameras
        .get(index)
        .ok_or_else(|| device(format!("no camera at index {index}")))?;
    let mut cam = cam.acquire().map_err(|e| device(e.to_string()))?;

    let mut cfgs = cam
        .generate_configuration(&[StreamRole::StillCapture])
        .ok_or_else(|| device("no still configuration".to_string()))?;
    match cfgs.get_mut(0) {
        Some(stream_cfg) => {
            stream_cfg.set_pixel_format(PixelFormat::new(u32::from_le_bytes(RGB_FOURCC), 0));
            stream_cfg.set_size(width, height);
        }
        None => return Err(device("no stream configuration".to_string())),
    }
    cam.configure(&mut cfgs).map_err(|e| device(e.to_string()))?;

    let stream = cfgs
        .get(0)
        .and_then(|cfg| cfg.stream())
        .ok_or_else(|| device("no stream in configuration".to_string()))?;

    let mut alloc = FrameBufferAllocator::new(&cam);
    let buffers = alloc.alloc(&stream).map_err(|e| device(e.to_string()))?;
    let buffers = buffers
        .into_iter()
        .map(|buf| MemoryMappedFrameBuffer::new(buf))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| device(e.to_string()))?;

    let mut reqs = Vec::with_capacity(buffers.len());
    for buf in buffers {
        let mut req = cam
            .create_request(None)
            .map_err(|e| device(format!("create request: {e}")))?;
        req.add_buffer(&stream, buf)
            .map_err(|e| device(format!("add buffer: {e}")))?;
        reqs.push(req);
    }

    let (callback_tx, callback_rx) = std::sync::mpsc::channel();
    cam.on_request_completed(move |req| {
        let _ = callback_tx.send(req);
    });

    cam.start(None).map_err(|e| device(e.to_string()))?;
    for req in &mut reqs {
        cam.queue_request(req).map_err(|(_, e)| device(e.to_string()))?;
    }

    loop {
        let mut req = match callback_rx.recv() {
            Ok(r) => r,
            Err(_) => return Ok(()),
        };

        let frame = match req.buffer(&stream) {
            Some(framebuffer) => {
                let planes = framebuffer.data();
                let used = framebuffer
                    .metadata()
                    .and_then(|m| m.planes().first().map(|p| p.bytes_used as usize));
                match (planes.first(), used) {
                    // Copy before the buffer is requeued
                    (Some(plane), Some(used)) => {
                        rgb_from_rows(&plane[..used.min(plane.len())], width, height)
                    }
                    _ => Err(CaptureError::CaptureFailure(
                        "completed request has no frame data".to_string(),
                    )),
                }
            }
            None => Err(CaptureError::CaptureFailure(
                "no framebuffer in request".to_string(),
            )),
        };

        match tx.try_send(frame) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => return Ok(()),
        }

        req.reuse(libcamera::request::ReuseFlag::ReuseBuffers);
        cam.queue_request(&mut req)
            .map_err(|(_, e)| CaptureError::CaptureFailure(e.to_string()))?;
    }
}

/// Pack R, G, B rows that may carry stride padding into an image.
fn rgb_from_rows(data: &[u8], width: u32, height: u32) -> FrameResult {
    let row = width as usize * 3;
    let rows = height as usize;
    if rows == 0 || row == 0 {
        return Err(CaptureError::CaptureFailure("zero-sized main frame".to_string()));
    }

    let stride = data.len() / rows;
    if stride < row {
        return Err(CaptureError::EncodingFailure(format!(
            "frame too short: got {} bytes for {}x{} RGB",
            data.len(),
            width,
            height
        )));
    }

    let mut rgb = Vec::with_capacity(row * rows);
    for line in data.chunks_exact(stride).take(rows) {
        rgb.extend_from_slice(&line[..row]);
    }

    RgbImage::from_raw(width, height, rgb).ok_or_else(|| {
        CaptureError::EncodingFailure(format!("RGB buffer does not fit {width}x{height}"))
    })
}
