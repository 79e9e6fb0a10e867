//! Standalone tracker: camera, detection and overlay in a local window.
//!
//! Keys: q / Esc quit, r reset progress, m switch between heart and lung.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use auscultation_tracker::camera::OpenCvCamera;
use auscultation_tracker::config::Config;
use auscultation_tracker::logging;
use auscultation_tracker::pipeline::{FrameProducer, ProducerConfig, SharedFrameBuffer, StopSignal, WaitOutcome};
use auscultation_tracker::pose::OnnxLandmarker;
use auscultation_tracker::render::{FramebufferRenderer, PreviewWindow, WindowCommand};
use auscultation_tracker::session::Session;
use auscultation_tracker::tracker::ExamMode;

/// Window poll interval while waiting for a frame
const FRAME_WAIT: Duration = Duration::from_millis(30);

#[derive(Parser, Debug)]
#[command(name = "tracker_view", version = env!("GIT_VERSION"), about = "Auscultation tracker in a local window")]
struct Args {
    /// TOML config; defaults are used when the file is missing
    #[arg(long, default_value = "tracker_view.toml")]
    config: PathBuf,

    /// Override tracking.initial_mode (heart or lung)
    #[arg(long)]
    mode: Option<ExamMode>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (mut config, from_file) = Config::load_or_default(&args.config)?;
    if let Some(mode) = args.mode {
        config.tracking.initial_mode = mode;
    }

    logging::init(&config.logging, "tracker_view")?;
    info!("Tracker View ({})", env!("GIT_VERSION"));
    if !from_file {
        info!("[config] {} not found, using defaults", args.config.display());
    }

    let stop = StopSignal::new();
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, stop.flag()).context("failed to register signal handler")?;
    }

    let camera = OpenCvCamera::open(&config.camera)?;
    let (width, height) = camera.resolution();
    let detector = OnnxLandmarker::new(&config.detector)?;
    let session = Session::new(config.tracking.initial_mode, config.tracking.alignment_radius);
    let frames = SharedFrameBuffer::new();

    let producer = FrameProducer::new(
        camera,
        detector,
        FramebufferRenderer::new(),
        session.clone(),
        Arc::clone(&frames),
        ProducerConfig::from_config(&config),
    )
    .with_stop_signal(stop.clone())
    .spawn()?;

    let mut window = PreviewWindow::new("Auscultation Tracker", width as usize, height as usize)?;
    info!("q/Esc: quit, r: reset, m: heart/lung");

    let mut reader = frames.reader();
    while window.is_open() && !stop.is_triggered() {
        match reader.wait_next(FRAME_WAIT) {
            WaitOutcome::Frame(published) => window.show(&published.frame)?,
            WaitOutcome::Timeout => window.idle(),
            WaitOutcome::Closed => break,
        }

        for command in window.commands() {
            match command {
                WindowCommand::Quit => stop.trigger(),
                WindowCommand::Reset => session.request_reset(),
                WindowCommand::ToggleMode => {
                    session.toggle_mode();
                }
            }
        }
    }

    let stats = producer.stop()?;
    let status = session.status();
    info!(
        "[main] {} {}/{} sites checked, {} frames",
        status.mode, status.done, status.total, stats.frames_read
    );
    Ok(())
}
