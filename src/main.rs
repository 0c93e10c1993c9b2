mod capture;
mod config;
mod encode;
mod error;
mod frame;
mod output;

use anyhow::{Context, Result};
use capture::FrameCapture;
use clap::Parser;
use config::{CaptureConfig, CaptureMode, RawEncoding};
use output::{OutputSink, PayloadSink, StdoutSilencer};
use std::time::Duration;

/// Capture one still frame from the camera and write it to stdout.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Output mode
    #[arg(long, value_enum, default_value_t = CaptureMode::Encoded)]
    mode: CaptureMode,

    /// Camera device index
    #[arg(short, long, default_value_t = 0)]
    device: u32,

    /// Auto-exposure warm-up before the frame is pulled, in milliseconds
    #[arg(long, default_value_t = 2000)]
    warmup_ms: u64,

    /// Rendering of the raw-mode payload
    #[arg(long, value_enum, default_value_t = RawEncoding::Binary)]
    raw_encoding: RawEncoding,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl From<&Args> for CaptureConfig {
    fn from(args: &Args) -> Self {
        CaptureConfig::default()
            .with_mode(args.mode)
            .with_device(args.device)
            .with_warmup(Duration::from_millis(args.warmup_ms))
            .with_raw_encoding(args.raw_encoding)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; stdout is reserved for the payload
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = CaptureConfig::from(&args);
    tracing::info!(
        "Capturing one {:?} frame from camera {}",
        config.mode(),
        config.device()
    );

    // Keep device chatter off the payload channel
    let silencer = StdoutSilencer::engage().context("Failed to redirect stdout")?;
    let mut sink = PayloadSink::new(
        silencer
            .original()
            .context("Failed to open payload handle on stdout")?,
    );

    let mut source =
        capture::open_source(&config).context("Failed to initialize camera capture")?;

    let frame = FrameCapture::new(config)
        .run(source.as_mut())
        .context("Failed to capture frame")?;

    sink.write_frame(&frame)
        .context("Failed to write frame to stdout")?;

    drop(source);
    drop(silencer);
    Ok(())
}
