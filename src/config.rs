use std::time::Duration;

use clap::ValueEnum;

use crate::frame::Stream;

/// Warm-up delay used when none is given.
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(2);

/// What ends up on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CaptureMode {
    /// Native sensor bytes from the raw stream
    Raw,
    /// Main stream converted to RGB and serialized as PNG
    Encoded,
}

impl CaptureMode {
    /// The pipeline stream this mode reads from.
    pub fn stream(&self) -> Stream {
        match self {
            CaptureMode::Raw => Stream::Raw,
            CaptureMode::Encoded => Stream::Main,
        }
    }
}

/// How a raw-mode buffer is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RawEncoding {
    /// The buffer as-is
    Binary,
    /// Byte-literal text form, e.g. `b'\x00\x10AB'`
    Escaped,
}

/// Configuration for a single still capture.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    mode: CaptureMode,
    device: u32,
    warmup: Duration,
    raw_encoding: RawEncoding,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Encoded,
            device: 0,
            warmup: DEFAULT_WARMUP,
            raw_encoding: RawEncoding::Binary,
        }
    }
}

impl CaptureConfig {
    pub fn with_mode(mut self, mode: CaptureMode) -> Self {
        self.mode = mode;
        self
    }

    /// Camera index; 0 is the first camera.
    pub fn with_device(mut self, device: u32) -> Self {
        self.device = device;
        self
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn with_raw_encoding(mut self, raw_encoding: RawEncoding) -> Self {
        self.raw_encoding = raw_encoding;
        self
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn device(&self) -> u32 {
        self.device
    }

    pub fn warmup(&self) -> Duration {
        self.warmup
    }

    pub fn raw_encoding(&self) -> RawEncoding {
        self.raw_encoding
    }
}
