use super::OutputSink;
use crate::error::{CaptureError, Result};
use crate::frame::Frame;
use std::io::Write;

/// Writes exactly one frame, unframed, to the wrapped handle.
pub struct PayloadSink<W: Write> {
    writer: W,
    written: bool,
}

impl<W: Write> PayloadSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            written: false,
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> OutputSink for PayloadSink<W> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.written {
            return Err(CaptureError::Output(std::io::Error::other("payload already written")));
        }

        self.writer.write_all(frame.bytes())?;
        self.writer.flush()?;
        self.written = true;

        tracing::info!("Wrote {:?} payload ({} bytes)", frame.kind(), frame.len());
        Ok(())
    }
}
