mod payload;
mod silence;

pub use payload::PayloadSink;
pub use silence::StdoutSilencer;

use crate::error::Result;
use crate::frame::Frame;

/// Trait for output destinations
pub trait OutputSink {
    /// Write a frame to the output
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;
}
