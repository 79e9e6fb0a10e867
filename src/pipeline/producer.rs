//! The single frame-producer loop: read, detect, map, align, render, publish.
//!
//! Runs on its own OS thread because every collaborator call (camera read,
//! model inference, JPEG encode) blocks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};

use super::buffer::SharedFrameBuffer;
use crate::camera::{FrameImage, Sensor};
use crate::config::Config;
use crate::pose::{Detection, Detector};
use crate::render::{FrameOverlay, OverlayState, Renderer, Tracking};
use crate::session::Session;
use crate::tracker::StableMapper;

/// How often transient failures are repeated in the log
const WARN_EVERY: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerConfig {
    /// Run the detector on every n-th frame; frames in between reuse the
    /// previous result.
    pub detect_every: u32,
    /// Sleep after a failed camera read
    pub read_backoff: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            detect_every: 1,
            read_backoff: Duration::from_millis(10),
        }
    }
}

impl ProducerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            detect_every: config.detector.detect_every.max(1),
            read_backoff: Duration::from_millis(config.camera.read_backoff_ms),
        }
    }
}

/// Shared stop flag. `flag()` hands out the raw atomic for `signal_hook`.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProducerStats {
    pub frames_read: u64,
    pub read_failures: u64,
    pub detections: u64,
    pub detection_failures: u64,
    pub render_failures: u64,
    pub frames_published: u64,
}

/// Frames per second over one-second windows
#[derive(Debug)]
struct FpsCounter {
    frames: u32,
    window_start: Instant,
    current: f32,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            frames: 0,
            window_start: Instant::now(),
            current: 0.0,
        }
    }

    fn tick(&mut self) -> f32 {
        self.frames += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            self.current = self.frames as f32 / elapsed.as_secs_f32();
            debug!("[fps] {:.1}", self.current);
            self.frames = 0;
            self.window_start = Instant::now();
        }
        self.current
    }
}

pub struct FrameProducer<S, D, R>
where
    S: Sensor,
    D: Detector<S::Image>,
    R: Renderer<S::Image>,
{
    sensor: S,
    detector: D,
    renderer: R,
    session: Session,
    buffer: Arc<SharedFrameBuffer<R::Output>>,
    stop: StopSignal,
    config: ProducerConfig,
    mapper: StableMapper,
    last_detection: Option<Detection>,
    last_timestamp_ms: Option<u64>,
    started: Instant,
    fps: FpsCounter,
    stats: ProducerStats,
}

impl<S, D, R> FrameProducer<S, D, R>
where
    S: Sensor,
    D: Detector<S::Image>,
    R: Renderer<S::Image>,
{
    pub fn new(
        sensor: S,
        detector: D,
        renderer: R,
        session: Session,
        buffer: Arc<SharedFrameBuffer<R::Output>>,
        config: ProducerConfig,
    ) -> Self {
        Self {
            sensor,
            detector,
            renderer,
            session,
            buffer,
            stop: StopSignal::new(),
            config: ProducerConfig {
                detect_every: config.detect_every.max(1),
                ..config
            },
            mapper: StableMapper::new(),
            last_detection: None,
            last_timestamp_ms: None,
            started: Instant::now(),
            fps: FpsCounter::new(),
            stats: ProducerStats::default(),
        }
    }

    /// Stop when `stop` fires instead of a private signal.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Loop until stopped. Closes the buffer, then releases the sensor.
    pub fn run(mut self) -> ProducerStats {
        info!(
            "[producer] started (detecting every {} frame(s))",
            self.config.detect_every
        );
        while !self.stop.is_triggered() {
            self.step();
        }

        self.buffer.close();
        self.sensor.release();
        info!(
            "[producer] stopped: {} read, {} published, {} detections, {} read failures",
            self.stats.frames_read,
            self.stats.frames_published,
            self.stats.detections,
            self.stats.read_failures
        );
        self.stats
    }

    pub fn spawn(self) -> Result<ProducerHandle>
    where
        S: 'static,
        D: 'static,
        R: 'static,
    {
        let stop = self.stop.clone();
        let join = std::thread::Builder::new()
            .name("frame-producer".into())
            .spawn(move || self.run())
            .context("failed to spawn producer thread")?;
        Ok(ProducerHandle {
            stop,
            join: Some(join),
        })
    }

    fn step(&mut self) {
        let image = match self.sensor.read_frame() {
            Ok(image) => image,
            Err(e) => {
                self.stats.read_failures += 1;
                if self.stats.read_failures % WARN_EVERY == 1 {
                    warn!(
                        "[producer] frame read failed ({} so far): {e:#}",
                        self.stats.read_failures
                    );
                }
                std::thread::sleep(self.config.read_backoff);
                return;
            }
        };
        self.stats.frames_read += 1;

        let ticket = self.session.start_frame();
        self.detect(&image);

        let (width, height) = image.dimensions();
        let fps = self.fps.tick();

        let rendered = match &self.last_detection {
            None => self.renderer.render(
                image,
                &FrameOverlay {
                    mode: ticket.mode,
                    fps,
                    state: OverlayState::Initializing,
                },
            ),
            Some(detection) => match &detection.pose {
                None => self.renderer.render(
                    image,
                    &FrameOverlay {
                        mode: ticket.mode,
                        fps,
                        state: OverlayState::NoPose,
                    },
                ),
                Some(pose) => {
                    let hands = detection.hand_centres(width, height);
                    let tracked = self
                        .mapper
                        .update(pose, ticket.mode, width, height)
                        .and_then(|set| {
                            self.session
                                .observe(&ticket, &set.targets, &hands)
                                .map(|report| (set, report))
                        });
                    let tracking = tracked.as_ref().map(|(targets, report)| Tracking {
                        targets: *targets,
                        report,
                    });
                    self.renderer.render(
                        image,
                        &FrameOverlay {
                            mode: ticket.mode,
                            fps,
                            state: OverlayState::Pose {
                                detection,
                                tracking,
                            },
                        },
                    )
                }
            },
        };

        match rendered {
            Ok(output) => {
                if self.buffer.publish(output).is_some() {
                    self.stats.frames_published += 1;
                }
            }
            Err(e) => {
                self.stats.render_failures += 1;
                if self.stats.render_failures % WARN_EVERY == 1 {
                    warn!("[producer] render failed: {e:#}");
                }
            }
        }
    }

    fn detect(&mut self, image: &S::Image) {
        let due = self.last_detection.is_none()
            || (self.stats.frames_read - 1) % u64::from(self.config.detect_every) == 0;
        if !due {
            return;
        }

        let timestamp_ms = self.next_timestamp();
        match self.detector.detect(image, timestamp_ms) {
            Ok(detection) => {
                self.stats.detections += 1;
                self.last_detection = Some(detection);
            }
            Err(e) => {
                self.stats.detection_failures += 1;
                if self.stats.detection_failures % WARN_EVERY == 1 {
                    warn!(
                        "[producer] detection failed ({} so far): {e:#}",
                        self.stats.detection_failures
                    );
                }
            }
        }
    }

    /// Milliseconds since start, bumped when the clock has not moved.
    fn next_timestamp(&mut self) -> u64 {
        let now = self.started.elapsed().as_millis() as u64;
        let ts = match self.last_timestamp_ms {
            Some(prev) if now <= prev => prev + 1,
            _ => now,
        };
        self.last_timestamp_ms = Some(ts);
        ts
    }
}

/// Owner of a spawned producer thread. Dropping it stops and joins the thread.
#[derive(Debug)]
pub struct ProducerHandle {
    stop: StopSignal,
    join: Option<JoinHandle<ProducerStats>>,
}

impl ProducerHandle {
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |j| j.is_finished())
    }

    pub fn stop(mut self) -> Result<ProducerStats> {
        self.stop.trigger();
        self.finish()
    }

    /// Wait for the producer to exit on its own (its stop signal fired elsewhere).
    pub fn join(mut self) -> Result<ProducerStats> {
        self.finish()
    }

    fn finish(&mut self) -> Result<ProducerStats> {
        match self.join.take() {
            Some(join) => join.join().map_err(|_| anyhow!("producer thread panicked")),
            None => Ok(ProducerStats::default()),
        }
    }
}

impl Drop for ProducerHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.stop.trigger();
            if let Err(e) = self.finish() {
                warn!("[producer] {e}");
            }
        }
    }
}
