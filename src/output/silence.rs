use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, FromRawFd, RawFd};

/// Points stdout (fd 1) at `/dev/null` while the camera stack initializes.
///
/// Anything the device stack prints, from Rust or native code, is discarded.
/// The original destination stays reachable through [`StdoutSilencer::original`]
/// and fd 1 is restored on drop.
pub struct StdoutSilencer {
    target: RawFd,
    original: File,
}

impl StdoutSilencer {
    pub fn engage() -> io::Result<Self> {
        io::stdout().flush()?;
        Self::engage_fd(libc::STDOUT_FILENO)
    }

    fn engage_fd(target: RawFd) -> io::Result<Self> {
        // SAFETY: dup only reads the descriptor table; the result is checked below.
        let saved = unsafe { libc::dup(target) };
        if saved < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `saved` was just returned by dup and has no other owner.
        let original = unsafe { File::from_raw_fd(saved) };

        let null = OpenOptions::new().write(true).open("/dev/null")?;
        redirect(null.as_raw_fd(), target)?;

        tracing::debug!("fd {} redirected to /dev/null (original kept as fd {})", target, saved);
        Ok(Self { target, original })
    }

    /// A separately opened handle on the original destination.
    pub fn original(&self) -> io::Result<File> {
        self.original.try_clone()
    }
}

fn redirect(from: RawFd, to: RawFd) -> io::Result<()> {
    // SAFETY: both descriptors are open for the duration of the call.
    if unsafe { libc::dup2(from, to) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl Drop for StdoutSilencer {
    fn drop(&mut self) {
        if self.target == libc::STDOUT_FILENO {
            let _ = io::stdout().flush();
        }
        if let Err(e) = redirect(self.original.as_raw_fd(), self.target) {
            tracing::warn!("Failed to restore fd {}: {}", self.target, e);
        }
    }
}
