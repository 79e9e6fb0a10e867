use anyhow::{bail, Context, Result};
use opencv::{
    core::{self, Mat},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs},
};

use super::{FrameImage, Sensor};
use crate::config::CameraConfig;

impl FrameImage for Mat {
    fn dimensions(&self) -> (u32, u32) {
        (self.cols().max(0) as u32, self.rows().max(0) as u32)
    }
}

/// OpenCV webcam, optionally mirrored so the view behaves like a mirror
pub struct OpenCvCamera {
    capture: VideoCapture,
    index: i32,
    width: u32,
    height: u32,
    mirror: bool,
    released: bool,
}

impl OpenCvCamera {
    /// Open the device. Failure here is fatal for the caller.
    pub fn open(config: &CameraConfig) -> Result<Self> {
        let index = config.index;
        let mut capture = VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32)
            .with_context(|| format!("failed to open camera {index}"))?;

        if !capture.is_opened()? {
            bail!("camera {index} is not available");
        }

        capture.set(videoio::CAP_PROP_FRAME_WIDTH, config.width as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, config.height as f64)?;
        capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        let fps = capture.get(videoio::CAP_PROP_FPS)?;
        log::info!(
            "[camera] {index} opened at {width}x{height} (requested {}x{}, {fps:.0} fps)",
            config.width,
            config.height
        );

        Ok(Self {
            capture,
            index,
            width,
            height,
            mirror: config.mirror,
            released: false,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Sensor for OpenCvCamera {
    type Image = Mat;

    /// BGR frame, flipped horizontally when mirroring
    fn read_frame(&mut self) -> Result<Mat> {
        if self.released {
            bail!("camera {} already released", self.index);
        }
        let mut frame = Mat::default();
        let grabbed = self.capture.read(&mut frame).context("failed to read frame")?;
        if !grabbed || frame.empty() {
            bail!("empty frame received");
        }

        if !self.mirror {
            return Ok(frame);
        }
        let mut flipped = Mat::default();
        core::flip(&frame, &mut flipped, 1).context("failed to mirror frame")?;
        Ok(flipped)
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match self.capture.release() {
            Ok(()) => log::info!("[camera] {} released", self.index),
            Err(e) => log::warn!("[camera] {} release failed: {e}", self.index),
        }
    }
}

impl Drop for OpenCvCamera {
    fn drop(&mut self) {
        self.release();
    }
}
