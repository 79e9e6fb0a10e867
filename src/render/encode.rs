use anyhow::{Context, Result};
use opencv::core::{Mat, Vec3b, Vector};
use opencv::prelude::*;
use opencv::{imgcodecs, imgproc};

use super::overlay::OverlayPainter;
use super::{FrameOverlay, Renderer};

/// BGR(A) frame to JPEG bytes
pub fn encode_jpeg(frame: &Mat, quality: i32) -> Result<Vec<u8>> {
    let params = Vector::from_iter([imgcodecs::IMWRITE_JPEG_QUALITY, quality]);
    let mut buf: Vector<u8> = Vector::new();

    // imencode expects BGR 8UC3; convert BGRA if needed
    let mat = if frame.channels() == 4 {
        let mut bgr = Mat::default();
        imgproc::cvt_color_def(frame, &mut bgr, imgproc::COLOR_BGRA2BGR)?;
        bgr
    } else {
        frame.clone()
    };

    imgcodecs::imencode(".jpg", &mat, &mut buf, &params).context("jpeg encode failed")?;
    Ok(buf.to_vec())
}

/// 0RGB pixels as minifb wants them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
    pub pixels: Vec<u32>,
    pub width: usize,
    pub height: usize,
}

impl Framebuffer {
    /// Copy a BGR 8UC3 frame
    pub fn from_bgr(frame: &Mat) -> Result<Self> {
        let width = frame.cols().max(0) as usize;
        let height = frame.rows().max(0) as usize;
        let mut pixels = vec![0u32; width * height];

        for y in 0..height {
            for x in 0..width {
                let pixel = frame.at_2d::<Vec3b>(y as i32, x as i32)?;
                let (r, g, b) = (pixel[2] as u32, pixel[1] as u32, pixel[0] as u32);
                pixels[y * width + x] = (r << 16) | (g << 8) | b;
            }
        }

        Ok(Self { pixels, width, height })
    }
}

/// Overlay + JPEG, for the MJPEG feed
#[derive(Debug)]
pub struct JpegRenderer {
    painter: OverlayPainter,
    quality: i32,
}

impl JpegRenderer {
    pub fn new(quality: i32) -> Self {
        Self {
            painter: OverlayPainter::new(),
            quality: quality.clamp(1, 100),
        }
    }
}

impl Renderer<Mat> for JpegRenderer {
    type Output = Vec<u8>;

    fn render(&mut self, mut image: Mat, overlay: &FrameOverlay<'_>) -> Result<Vec<u8>> {
        self.painter.paint(&mut image, overlay).context("overlay drawing failed")?;
        encode_jpeg(&image, self.quality)
    }
}

/// Overlay + framebuffer copy, for the local window
#[derive(Debug, Default)]
pub struct FramebufferRenderer {
    painter: OverlayPainter,
}

impl FramebufferRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Renderer<Mat> for FramebufferRenderer {
    type Output = Framebuffer;

    fn render(&mut self, mut image: Mat, overlay: &FrameOverlay<'_>) -> Result<Framebuffer> {
        self.painter.paint(&mut image, overlay).context("overlay drawing failed")?;
        Framebuffer::from_bgr(&image)
    }
}
