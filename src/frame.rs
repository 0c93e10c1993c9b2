use image::RgbImage;
use std::borrow::Cow;
use std::fmt;

/// Named output path of the capture pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// RGB-convertible pixel data
    Main,
    /// Native, unconverted sensor data
    Raw,
}

impl Stream {
    pub fn name(&self) -> &'static str {
        match self {
            Stream::Main => "main",
            Stream::Raw => "raw",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sensor data exactly as dequeued, in the device's native layout.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub fourcc: [u8; 4],
    pub data: Vec<u8>,
}

impl PixelBuffer {
    pub fn fourcc_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.fourcc)
    }
}

/// One frame pulled from a stream.
#[derive(Debug)]
pub enum Captured {
    /// Main stream, already converted to RGB
    Rgb(RgbImage),
    /// Raw stream
    Sensor(PixelBuffer),
}

impl Captured {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Captured::Rgb(image) => image.dimensions(),
            Captured::Sensor(buffer) => (buffer.width, buffer.height),
        }
    }

    pub fn byte_len(&self) -> usize {
        match self {
            Captured::Rgb(image) => image.as_raw().len(),
            Captured::Sensor(buffer) => buffer.data.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Raw,
    Png,
}

/// The payload of one capture. Immutable once built.
#[derive(Debug)]
pub struct Frame {
    kind: FrameKind,
    bytes: Vec<u8>,
}

impl Frame {
    pub fn new(kind: FrameKind, bytes: Vec<u8>) -> Self {
        Self { kind, bytes }
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}
