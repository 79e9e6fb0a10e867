//! Tracker server: runs the camera/detection loop once, for the lifetime of
//! the process, and serves the annotated frames as an MJPEG feed along with
//! the status, reset and health routes. Feed clients may come and go freely.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::net::TcpListener;

use auscultation_tracker::camera::OpenCvCamera;
use auscultation_tracker::config::Config;
use auscultation_tracker::logging;
use auscultation_tracker::pipeline::{FrameProducer, ProducerConfig, SharedFrameBuffer, StopSignal};
use auscultation_tracker::pose::OnnxLandmarker;
use auscultation_tracker::render::JpegRenderer;
use auscultation_tracker::server::{self, AppState};
use auscultation_tracker::session::Session;
use auscultation_tracker::tracker::ExamMode;

#[derive(Parser, Debug)]
#[command(name = "tracker_server", version = env!("GIT_VERSION"), about = "Serve the auscultation tracker over HTTP")]
struct Args {
    /// TOML config; defaults are used when the file is missing
    #[arg(long, default_value = "tracker_server.toml")]
    config: PathBuf,

    /// Override server.listen_addr
    #[arg(long)]
    listen: Option<String>,

    /// Override tracking.initial_mode (heart or lung)
    #[arg(long)]
    mode: Option<ExamMode>,
}

/// Resolves once `stop` fires (SIGINT/SIGTERM)
async fn stopped(stop: StopSignal) {
    while !stop.is_triggered() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (mut config, from_file) = Config::load_or_default(&args.config)?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    if let Some(mode) = args.mode {
        config.tracking.initial_mode = mode;
    }

    logging::init(&config.logging, "tracker_server")?;
    info!("Tracker Server ({})", env!("GIT_VERSION"));
    if !from_file {
        info!("[config] {} not found, using defaults", args.config.display());
    }
    info!(
        "[config] listen_addr={}, mode={}, detect_every={}, jpeg_quality={}",
        config.server.listen_addr,
        config.tracking.initial_mode,
        config.detector.detect_every,
        config.server.jpeg_quality
    );

    let stop = StopSignal::new();
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, stop.flag()).context("failed to register signal handler")?;
    }

    // bind first so a busy port fails before the camera is claimed
    let listener = TcpListener::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.listen_addr))?;

    let camera = OpenCvCamera::open(&config.camera)?;
    let detector = OnnxLandmarker::new(&config.detector)?;
    let session = Session::new(config.tracking.initial_mode, config.tracking.alignment_radius);
    let frames = SharedFrameBuffer::new();

    let producer = FrameProducer::new(
        camera,
        detector,
        JpegRenderer::new(config.server.jpeg_quality),
        session.clone(),
        Arc::clone(&frames),
        ProducerConfig::from_config(&config),
    )
    .with_stop_signal(stop.clone())
    .spawn()?;

    info!("  MJPEG feed:  http://{}/feed?mode=heart", config.server.listen_addr);
    info!("  Status:      http://{}/status", config.server.listen_addr);

    let state = AppState {
        session,
        frames,
        frame_wait: Duration::from_millis(config.server.frame_wait_ms),
    };
    server::serve(listener, state, stopped(stop.clone())).await?;

    let stats = tokio::task::spawn_blocking(move || producer.stop()).await??;
    info!(
        "[main] stopped after {} frames ({} published)",
        stats.frames_read, stats.frames_published
    );
    Ok(())
}
