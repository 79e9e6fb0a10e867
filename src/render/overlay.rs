//! OpenCV drawing of the exam overlay onto a BGR frame.

use std::time::Instant;

use anyhow::Result;
use opencv::{
    core::{self, Mat, Point, Rect, Scalar, Size, Vector},
    imgproc,
    prelude::*,
};

use super::skeleton::*;
use super::{FrameOverlay, OverlayState, Tracking};
use crate::pose::{Detection, Hand, PixelPoint, Pose};
use crate::tracker::{ExamMode, TargetAlignment, TorsoAnchors};

const FONT: i32 = imgproc::FONT_HERSHEY_SIMPLEX;
const POINT_RADIUS: i32 = 10;
const BAR_HEIGHT: i32 = 32;
const HUD_WIDTH: i32 = 200;
const HUD_ROW: i32 = 26;

/// RGB constant to an OpenCV BGR scalar
fn bgr(rgb: u32) -> Scalar {
    Scalar::new(
        (rgb & 0xFF) as f64,
        ((rgb >> 8) & 0xFF) as f64,
        ((rgb >> 16) & 0xFF) as f64,
        0.0,
    )
}

fn pt(p: PixelPoint) -> Point {
    Point::new(p.x, p.y)
}

fn line(frame: &mut Mat, a: Point, b: Point, color: u32, thickness: i32) -> Result<()> {
    imgproc::line(frame, a, b, bgr(color), thickness, imgproc::LINE_AA, 0)?;
    Ok(())
}

/// `thickness` < 0 fills
fn circle(frame: &mut Mat, center: Point, radius: i32, color: u32, thickness: i32) -> Result<()> {
    imgproc::circle(frame, center, radius, bgr(color), thickness, imgproc::LINE_AA, 0)?;
    Ok(())
}

fn text(frame: &mut Mat, s: &str, org: Point, scale: f64, color: u32, thickness: i32) -> Result<()> {
    imgproc::put_text(frame, s, org, FONT, scale, bgr(color), thickness, imgproc::LINE_AA, false)?;
    Ok(())
}

fn text_size(s: &str, scale: f64) -> Result<Size> {
    let mut baseline = 0;
    Ok(imgproc::get_text_size(s, FONT, scale, 1, &mut baseline)?)
}

/// Mix `layer` over `frame` with weight `alpha`
fn blend(frame: &mut Mat, layer: &Mat, alpha: f64) -> Result<()> {
    let mut mixed = Mat::default();
    core::add_weighted(layer, alpha, &*frame, 1.0 - alpha, 0.0, &mut mixed, -1)?;
    *frame = mixed;
    Ok(())
}

fn panel(frame: &mut Mat, rect: Rect, alpha: f64) -> Result<()> {
    let mut layer = frame.try_clone()?;
    imgproc::rectangle(&mut layer, rect, bgr(PANEL_COLOR), imgproc::FILLED, imgproc::LINE_8, 0)?;
    blend(frame, &layer, alpha)
}

/// Dashed segment, `seg` pixels on and off
fn dashed(frame: &mut Mat, a: PixelPoint, b: PixelPoint, seg: f32, color: u32) -> Result<()> {
    let length = a.distance(&b);
    if length < 1.0 {
        return Ok(());
    }
    let (dx, dy) = ((b.x - a.x) as f32 / length, (b.y - a.y) as f32 / length);
    let mut d = 0.0;
    while d < length {
        let e = (d + seg).min(length);
        let s = Point::new((a.x as f32 + dx * d) as i32, (a.y as f32 + dy * d) as i32);
        let t = Point::new((a.x as f32 + dx * e) as i32, (a.y as f32 + dy * e) as i32);
        line(frame, s, t, color, 1)?;
        d += seg * 2.0;
    }
    Ok(())
}

fn accent(mode: ExamMode) -> u32 {
    match mode {
        ExamMode::Cardiac => CARDIAC_COLOR,
        ExamMode::Lung => LUNG_ACCENT_COLOR,
    }
}

/// Paints a [`FrameOverlay`]; owns the clock used for the pulse animations.
#[derive(Debug)]
pub struct OverlayPainter {
    started: Instant,
}

impl Default for OverlayPainter {
    fn default() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl OverlayPainter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paint(&self, frame: &mut Mat, overlay: &FrameOverlay<'_>) -> Result<()> {
        let (w, h) = (frame.cols(), frame.rows());
        let t = self.started.elapsed().as_secs_f32();

        match overlay.state {
            OverlayState::Initializing => {
                text(frame, "Initializing...", Point::new(w / 2 - 70, h / 2), 0.6, DIM_TEXT_COLOR, 1)?;
            }
            OverlayState::NoPose => {
                text(frame, "Step into frame", Point::new(w / 2 - 80, h / 2 - 10), 0.7, CARDIAC_COLOR, 2)?;
                text(
                    frame,
                    "Ensure upper body is visible",
                    Point::new(w / 2 - 120, h / 2 + 20),
                    0.42,
                    DIM_TEXT_COLOR,
                    1,
                )?;
                draw_top_bar(frame, overlay.mode, overlay.fps)?;
            }
            OverlayState::Pose { detection, tracking } => {
                if let Some(pose) = &detection.pose {
                    draw_skeleton(frame, pose)?;
                }
                if let Some(tracking) = tracking {
                    draw_torso_zone(frame, &tracking.targets.anchors)?;
                    if overlay.mode == ExamMode::Cardiac {
                        draw_route(frame, &tracking.report.targets)?;
                    }
                }
                draw_hands(frame, detection)?;
                if let Some(tracking) = tracking {
                    draw_targets(frame, overlay.mode, &tracking, t)?;
                    draw_hud(frame, overlay.mode, &tracking.report.targets)?;
                    draw_bottom_bar(frame, overlay.mode, tracking.report.progress.all_done)?;
                }
                draw_top_bar(frame, overlay.mode, overlay.fps)?;
            }
        }
        Ok(())
    }
}

fn draw_skeleton(frame: &mut Mat, pose: &Pose) -> Result<()> {
    let (w, h) = (frame.cols() as u32, frame.rows() as u32);
    for (a, b) in POSE_CONNECTIONS {
        let (a, b) = (pose.get(a), pose.get(b));
        if a.is_finite() && b.is_finite() {
            line(frame, pt(a.to_pixel(w, h)), pt(b.to_pixel(w, h)), SKELETON_COLOR, 1)?;
        }
    }
    for joint in POSE_JOINTS {
        let lm = pose.get(joint);
        if lm.is_finite() {
            circle(frame, pt(lm.to_pixel(w, h)), 3, SKELETON_COLOR, -1)?;
        }
    }
    Ok(())
}

fn draw_hand(frame: &mut Mat, hand: &Hand) -> Result<()> {
    let (w, h) = (frame.cols() as u32, frame.rows() as u32);
    let lms = hand.landmarks();
    for (a, b) in HAND_CONNECTIONS {
        if lms[a].is_finite() && lms[b].is_finite() {
            line(frame, pt(lms[a].to_pixel(w, h)), pt(lms[b].to_pixel(w, h)), HAND_COLOR, 1)?;
        }
    }
    for lm in lms.iter().filter(|lm| lm.is_finite()) {
        circle(frame, pt(lm.to_pixel(w, h)), 2, HAND_JOINT_COLOR, -1)?;
    }
    Ok(())
}

fn draw_hands(frame: &mut Mat, detection: &Detection) -> Result<()> {
    for hand in &detection.hands {
        draw_hand(frame, hand)?;
    }
    Ok(())
}

/// Translucent torso quad with a dashed midline
fn draw_torso_zone(frame: &mut Mat, anchors: &TorsoAnchors) -> Result<()> {
    let quad: Vector<Point> = Vector::from_iter([
        pt(anchors.right_shoulder),
        pt(anchors.left_shoulder),
        pt(anchors.left_hip),
        pt(anchors.right_hip),
    ]);
    let polys: Vector<Vector<Point>> = Vector::from_iter([quad]);

    let mut layer = frame.try_clone()?;
    imgproc::fill_poly(&mut layer, &polys, bgr(0x1E1923), imgproc::LINE_8, 0, Point::default())?;
    blend(frame, &layer, 0.15)?;
    imgproc::polylines(frame, &polys, true, bgr(0x373741), 1, imgproc::LINE_AA, 0)?;

    let mid_x = anchors.midline_x();
    let top = anchors.left_shoulder.y.min(anchors.right_shoulder.y);
    let bottom = anchors.left_hip.y.max(anchors.right_hip.y);
    dashed(
        frame,
        PixelPoint::new(mid_x, top),
        PixelPoint::new(mid_x, bottom),
        8.0,
        GUIDE_COLOR,
    )
}

/// Dashed path through the targets in examination order
fn draw_route(frame: &mut Mat, targets: &[TargetAlignment]) -> Result<()> {
    let mut ordered: Vec<&TargetAlignment> = targets.iter().collect();
    ordered.sort_by_key(|t| t.ordinal);
    for pair in ordered.windows(2) {
        dashed(frame, pair[0].position, pair[1].position, 6.0, GUIDE_COLOR)?;
    }
    Ok(())
}

fn draw_targets(frame: &mut Mat, mode: ExamMode, tracking: &Tracking<'_>, t: f32) -> Result<()> {
    let next = tracking.report.next_expected;
    for target in &tracking.report.targets {
        draw_target(frame, mode, target, next == Some(target.ordinal), t)?;
        if let Some(hand) = target.aligned_hand {
            line(frame, pt(hand), pt(target.position), ALIGNED_COLOR, 2)?;
        }
    }
    Ok(())
}

fn draw_target(frame: &mut Mat, mode: ExamMode, target: &TargetAlignment, is_next: bool, t: f32) -> Result<()> {
    let center = pt(target.position);
    let mut r = POINT_RADIUS;

    let color = if target.aligned() {
        r += 3;
        let pulse = (4.0 * (t * 4.0).sin().abs()) as i32;
        circle(frame, center, r + 4 + pulse, ALIGNED_COLOR, 2)?;
        ALIGNED_COLOR
    } else if target.visited {
        VISITED_COLOR
    } else {
        let idle = match mode {
            ExamMode::Cardiac if is_next => CARDIAC_COLOR,
            ExamMode::Cardiac => CARDIAC_LIGHT_COLOR,
            ExamMode::Lung => LUNG_COLOR,
        };
        if is_next {
            let breath = (3.0 * (t * 2.0).sin().abs()) as i32;
            let ring = match mode {
                ExamMode::Cardiac => CARDIAC_COLOR,
                ExamMode::Lung => LUNG_COLOR,
            };
            circle(frame, center, r + breath + 6, ring, 1)?;
        }
        idle
    };

    circle(frame, center, r, color, -1)?;
    circle(frame, center, r + 1, TEXT_COLOR, 1)?;

    if mode == ExamMode::Cardiac {
        let num = target.ordinal.to_string();
        let size = text_size(&num, 0.35)?;
        text(frame, &num, Point::new(center.x - size.width / 2, center.y + size.height / 2), 0.35, TEXT_COLOR, 1)?;
    }

    // crosshair ticks
    for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
        let inner = Point::new(center.x + dx * r, center.y + dy * r);
        let outer = Point::new(center.x + dx * (r + 4), center.y + dy * (r + 4));
        line(frame, inner, outer, DIM_TEXT_COLOR, 1)?;
    }

    let size = text_size(target.name, 0.34)?;
    let lx = center.x - size.width / 2;
    let ly = center.y - r - 12;
    panel(frame, Rect::new(lx - 4, ly - size.height - 2, size.width + 8, size.height + 5), 0.7)?;
    text(frame, target.name, Point::new(lx, ly), 0.34, TEXT_COLOR, 1)?;

    if (is_next || target.aligned()) && !target.description.is_empty() {
        let size = text_size(target.description, 0.3)?;
        let origin = Point::new(center.x - size.width / 2, center.y + r + 16);
        text(frame, target.description, origin, 0.3, DIM_TEXT_COLOR, 1)?;
    }
    Ok(())
}

/// Checklist panel on the right with a progress bar
fn draw_hud(frame: &mut Mat, mode: ExamMode, targets: &[TargetAlignment]) -> Result<()> {
    let w = frame.cols();
    let panel_h = 55 + targets.len() as i32 * HUD_ROW + 40;
    let (x1, y1) = (w - HUD_WIDTH - 10, 42);
    let x2 = w - 10;
    panel(frame, Rect::new(x1, y1, HUD_WIDTH, panel_h), 0.82)?;

    let title = match mode {
        ExamMode::Cardiac => "CARDIAC EXAM",
        ExamMode::Lung => "LUNG FIELDS",
    };
    text(frame, title, Point::new(x1 + 12, y1 + 20), 0.42, accent(mode), 1)?;
    line(frame, Point::new(x1 + 10, y1 + 28), Point::new(x2 - 10, y1 + 28), 0x2D2832, 1)?;

    let mut ordered: Vec<&TargetAlignment> = targets.iter().collect();
    ordered.sort_by_key(|t| t.ordinal);
    let mut y = y1 + 44;
    for target in &ordered {
        let badge = Point::new(x1 + 20, y - 3);
        circle(frame, badge, 7, if target.visited { ALIGNED_COLOR } else { 0x37323C }, -1)?;
        circle(frame, badge, 7, 0x464650, 1)?;
        let num = target.ordinal.to_string();
        let size = text_size(&num, 0.28)?;
        text(frame, &num, Point::new(badge.x - size.width / 2, badge.y + size.height / 2), 0.28, TEXT_COLOR, 1)?;

        let color = if target.visited { ALIGNED_COLOR } else { DIM_TEXT_COLOR };
        text(frame, target.name, Point::new(x1 + 34, y), 0.32, color, 1)?;
        if target.visited {
            text(frame, "OK", Point::new(x2 - 30, y), 0.26, ALIGNED_COLOR, 1)?;
        }
        y += HUD_ROW;
    }

    let done = targets.iter().filter(|t| t.visited).count();
    let total = targets.len().max(1);
    let bar = Rect::new(x1 + 10, y + 4, HUD_WIDTH - 20, 7);
    let fill = (bar.width as usize * done / total) as i32;
    imgproc::rectangle(frame, bar, bgr(0x26232B), imgproc::FILLED, imgproc::LINE_8, 0)?;
    if fill > 0 {
        let filled = Rect::new(bar.x, bar.y, fill, bar.height);
        imgproc::rectangle(frame, filled, bgr(accent(mode)), imgproc::FILLED, imgproc::LINE_8, 0)?;
    }
    imgproc::rectangle(frame, bar, bgr(0x3A373C), 1, imgproc::LINE_8, 0)?;
    let pct = format!("{}%", done * 100 / total);
    text(frame, &pct, Point::new(bar.x + bar.width + 4, bar.y + 7), 0.24, DIM_TEXT_COLOR, 1)
}

fn draw_top_bar(frame: &mut Mat, mode: ExamMode, fps: f32) -> Result<()> {
    let w = frame.cols();
    panel(frame, Rect::new(0, 0, w, BAR_HEIGHT), 0.75)?;
    let (title, color) = match mode {
        ExamMode::Cardiac => ("HEART PLACEMENT TRACKER", CARDIAC_TITLE_COLOR),
        ExamMode::Lung => ("LUNG PLACEMENT TRACKER", LUNG_TITLE_COLOR),
    };
    text(frame, title, Point::new(10, 22), 0.42, color, 1)?;
    text(frame, &format!("FPS {}", fps as i32), Point::new(w - 70, 22), 0.3, DIM_TEXT_COLOR, 1)
}

fn draw_bottom_bar(frame: &mut Mat, mode: ExamMode, all_done: bool) -> Result<()> {
    let (w, h) = (frame.cols(), frame.rows());
    panel(frame, Rect::new(0, h - BAR_HEIGHT, w, BAR_HEIGHT), 0.7)?;
    if all_done {
        let label = match mode {
            ExamMode::Cardiac => "ALL CARDIAC POINTS CHECKED",
            ExamMode::Lung => "ALL LUNG POINTS CHECKED",
        };
        text(frame, label, Point::new(w / 2 - 140, h - 10), 0.44, ALIGNED_COLOR, 1)
    } else {
        text(
            frame,
            "Place hand on each target point",
            Point::new(w / 2 - 130, h - 12),
            0.38,
            DIM_TEXT_COLOR,
            1,
        )
    }
}
