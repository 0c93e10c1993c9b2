use thiserror::Error;

/// Failures of the one-shot capture. None of these are recovered.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("frame capture failed: {0}")]
    CaptureFailure(String),

    #[error("frame encoding failed: {0}")]
    EncodingFailure(String),

    #[error("payload output failed: {0}")]
    Output(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CaptureError>;
