//! Regions of interest and the letterbox mapping between frame pixels and
//! model input pixels.

use super::landmark::Landmark;

/// Hand crop side relative to the wrist-to-index-finger distance
const HAND_CROP_SCALE: f32 = 4.5;
/// Smallest hand crop side in pixels
const MIN_HAND_CROP_PX: f32 = 48.0;

/// Axis-aligned rectangle in frame pixels, always inside the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub fn full(frame_w: u32, frame_h: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width: frame_w as i32,
            height: frame_h as i32,
        }
    }

    /// Square of side `side` centred on (cx, cy), clipped to the frame.
    /// `None` when nothing of it is left.
    pub fn square_around(cx: f32, cy: f32, side: f32, frame_w: u32, frame_h: u32) -> Option<Self> {
        if !(cx.is_finite() && cy.is_finite() && side.is_finite()) || side < 1.0 {
            return None;
        }
        let half = side / 2.0;
        let x0 = (cx - half).max(0.0);
        let y0 = (cy - half).max(0.0);
        let x1 = (cx + half).min(frame_w as f32);
        let y1 = (cy + half).min(frame_h as f32);
        let rect = Self {
            x: x0 as i32,
            y: y0 as i32,
            width: (x1 - x0) as i32,
            height: (y1 - y0) as i32,
        };
        (rect.width >= 2 && rect.height >= 2).then_some(rect)
    }
}

/// Crop around a hand, from the wrist and index-finger pose landmarks
/// (normalized coordinates).
pub fn hand_region(wrist: &Landmark, index: &Landmark, frame_w: u32, frame_h: u32) -> Option<PixelRect> {
    let (fw, fh) = (frame_w as f32, frame_h as f32);
    let (wx, wy) = (wrist.x * fw, wrist.y * fh);
    let (ix, iy) = (index.x * fw, index.y * fh);
    let reach = (ix - wx).hypot(iy - wy);
    // the palm sits between wrist and knuckles, shifted toward the fingers
    let cx = wx + (ix - wx) * 0.6;
    let cy = wy + (iy - wy) * 0.6;
    let side = (reach * HAND_CROP_SCALE).max(MIN_HAND_CROP_PX);
    PixelRect::square_around(cx, cy, side, frame_w, frame_h)
}

/// Aspect-preserving fit of a [`PixelRect`] into a square model input,
/// padded evenly on the short axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub rect: PixelRect,
    pub input_size: i32,
    pub scaled_w: i32,
    pub scaled_h: i32,
    pub pad_x: i32,
    pub pad_y: i32,
}

impl Letterbox {
    pub fn fit(rect: PixelRect, input_size: i32) -> Self {
        let longest = rect.width.max(rect.height).max(1) as f32;
        let scale = input_size as f32 / longest;
        let scaled_w = ((rect.width as f32 * scale).round() as i32).clamp(1, input_size);
        let scaled_h = ((rect.height as f32 * scale).round() as i32).clamp(1, input_size);
        Self {
            rect,
            input_size,
            scaled_w,
            scaled_h,
            pad_x: (input_size - scaled_w) / 2,
            pad_y: (input_size - scaled_h) / 2,
        }
    }

    /// Model input pixels to frame pixels
    pub fn to_frame(&self, x_in: f32, y_in: f32) -> (f32, f32) {
        let sx = self.scaled_w as f32 / self.rect.width.max(1) as f32;
        let sy = self.scaled_h as f32 / self.rect.height.max(1) as f32;
        (
            self.rect.x as f32 + (x_in - self.pad_x as f32) / sx,
            self.rect.y as f32 + (y_in - self.pad_y as f32) / sy,
        )
    }

    /// Model input pixels to a landmark normalized to the whole frame
    pub fn to_landmark(&self, x_in: f32, y_in: f32, visibility: f32, frame_w: u32, frame_h: u32) -> Landmark {
        let (x, y) = self.to_frame(x_in, y_in);
        Landmark::new(x / frame_w as f32, y / frame_h as f32, visibility)
    }
}
