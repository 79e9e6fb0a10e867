//! Auscultation sites derived from the torso landmarks of one pose.
//!
//! All geometry is done in integer pixels of the processed frame. The camera
//! feed is mirrored before detection, so the patient's right shoulder shows up
//! on screen-left; side offsets are therefore taken toward the matching
//! shoulder landmark instead of toward a fixed screen direction.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pose::{PixelPoint, Pose, PoseLandmark};

/// Sternal border, as a fraction of shoulder width from the midline
pub const STERNAL_BORDER_FRACTION: f64 = 0.11;
/// Midclavicular line, as a fraction of shoulder width from the midline
pub const MIDCLAVICULAR_FRACTION: f64 = 0.32;
/// Below this shoulder width (px) the torso is treated as degenerate
pub const MIN_SHOULDER_WIDTH_PX: i32 = 4;
/// Anchors further than this outside the normalized frame are rejected
pub const MAX_ANCHOR_NORM: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExamMode {
    #[serde(rename = "lung")]
    Lung,
    #[default]
    #[serde(rename = "heart", alias = "cardiac")]
    Cardiac,
}

impl ExamMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lung => "lung",
            Self::Cardiac => "heart",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Lung => Self::Cardiac,
            Self::Cardiac => Self::Lung,
        }
    }

    fn sites(self) -> &'static [SiteDef] {
        match self {
            Self::Lung => &LUNG_SITES,
            Self::Cardiac => &CARDIAC_SITES,
        }
    }

    /// Target names in ordinal order.
    pub fn target_names(self) -> impl Iterator<Item = &'static str> {
        self.sites().iter().map(|s| s.name)
    }

    pub fn target_count(self) -> usize {
        self.sites().len()
    }
}

impl fmt::Display for ExamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown exam mode '{0}' (expected 'heart' or 'lung')")]
pub struct UnknownMode(pub String);

impl FromStr for ExamMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lung" => Ok(Self::Lung),
            "heart" | "cardiac" => Ok(Self::Cardiac),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

/// Anatomical side of the patient (not the screen)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Side {
    #[serde(rename = "L")]
    Left,
    #[serde(rename = "R")]
    Right,
}

#[derive(Debug, Clone, Copy)]
enum Column {
    SternalBorder,
    Midclavicular,
}

impl Column {
    fn fraction(self) -> f64 {
        match self {
            Self::SternalBorder => STERNAL_BORDER_FRACTION,
            Self::Midclavicular => MIDCLAVICULAR_FRACTION,
        }
    }
}

struct SiteDef {
    name: &'static str,
    description: &'static str,
    side: Side,
    column: Column,
    /// Fraction of torso height below the shoulder line
    level: f64,
}

const fn site(
    name: &'static str,
    description: &'static str,
    side: Side,
    column: Column,
    level: f64,
) -> SiteDef {
    SiteDef { name, description, side, column, level }
}

const LUNG_SITES: [SiteDef; 7] = [
    site("R Apex", "right apex, below clavicle", Side::Right, Column::Midclavicular, 0.03),
    site("L Apex", "left apex, below clavicle", Side::Left, Column::Midclavicular, 0.03),
    site("R Upper", "right upper lobe, 2nd ICS", Side::Right, Column::Midclavicular, 0.14),
    site("L Upper", "left upper lobe, 2nd ICS", Side::Left, Column::Midclavicular, 0.14),
    site("R Middle", "right middle lobe, 4th ICS", Side::Right, Column::Midclavicular, 0.32),
    site("R Lower", "right lower lobe, 6th ICS", Side::Right, Column::Midclavicular, 0.50),
    site("L Lower", "left lower lobe, 6th ICS", Side::Left, Column::Midclavicular, 0.50),
];

const CARDIAC_SITES: [SiteDef; 5] = [
    site("Aortic", "2nd right intercostal", Side::Right, Column::SternalBorder, 0.12),
    site("Pulmonic", "2nd left intercostal", Side::Left, Column::SternalBorder, 0.12),
    site("Erb's Pt", "3rd left intercostal", Side::Left, Column::SternalBorder, 0.21),
    site("Tricuspid", "4th left intercostal", Side::Left, Column::SternalBorder, 0.30),
    site("Mitral", "5th ICS, midclavicular", Side::Left, Column::Midclavicular, 0.39),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("{0} landmark is not finite")]
    NonFiniteLandmark(&'static str),
    #[error("{0} landmark is far outside the frame")]
    OutOfFrame(&'static str),
    #[error("shoulder width {0}px is too narrow")]
    NarrowShoulders(i32),
    #[error("torso height {0}px is not positive")]
    CollapsedTorso(i32),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnatomicalTarget {
    pub name: &'static str,
    pub description: &'static str,
    pub position: PixelPoint,
    /// 1-based examination order
    pub ordinal: u32,
    pub side: Side,
}

/// Shoulder and hip anchors in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TorsoAnchors {
    pub left_shoulder: PixelPoint,
    pub right_shoulder: PixelPoint,
    pub left_hip: PixelPoint,
    pub right_hip: PixelPoint,
}

impl TorsoAnchors {
    pub fn from_pose(pose: &Pose, width: u32, height: u32) -> Result<Self, GeometryError> {
        let anchor = |index: PoseLandmark| {
            let lm = pose.get(index);
            if !lm.is_finite() {
                Err(GeometryError::NonFiniteLandmark(index.name()))
            } else if lm.x.abs() > MAX_ANCHOR_NORM || lm.y.abs() > MAX_ANCHOR_NORM {
                Err(GeometryError::OutOfFrame(index.name()))
            } else {
                Ok(lm.to_pixel(width, height))
            }
        };
        Ok(Self {
            left_shoulder: anchor(PoseLandmark::LeftShoulder)?,
            right_shoulder: anchor(PoseLandmark::RightShoulder)?,
            left_hip: anchor(PoseLandmark::LeftHip)?,
            right_hip: anchor(PoseLandmark::RightHip)?,
        })
    }

    /// Mean of the per-side vertical shoulder-to-hip distances
    pub fn torso_height(&self) -> i32 {
        ((self.left_hip.y - self.left_shoulder.y) + (self.right_hip.y - self.right_shoulder.y)) / 2
    }

    pub fn shoulder_width(&self) -> i32 {
        (self.right_shoulder.x - self.left_shoulder.x).abs()
    }

    pub fn midline_x(&self) -> i32 {
        (self.left_shoulder.x + self.right_shoulder.x).div_euclid(2)
    }

    pub fn shoulder_line_y(&self) -> i32 {
        (self.left_shoulder.y + self.right_shoulder.y).div_euclid(2)
    }

    /// +1 if the patient's right side lies toward larger x, -1 otherwise.
    fn right_direction(&self) -> i32 {
        if self.right_shoulder.x <= self.left_shoulder.x {
            -1
        } else {
            1
        }
    }
}

/// Targets of one mode for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSet {
    pub mode: ExamMode,
    pub anchors: TorsoAnchors,
    pub targets: Vec<AnatomicalTarget>,
}

/// Compute the auscultation targets of `mode` for a pose in a `width` x `height` frame.
pub fn map_targets(
    pose: &Pose,
    mode: ExamMode,
    width: u32,
    height: u32,
) -> Result<TargetSet, GeometryError> {
    let anchors = TorsoAnchors::from_pose(pose, width, height)?;

    let shoulder_width = anchors.shoulder_width();
    if shoulder_width < MIN_SHOULDER_WIDTH_PX {
        return Err(GeometryError::NarrowShoulders(shoulder_width));
    }
    let torso_height = anchors.torso_height();
    if torso_height <= 0 {
        return Err(GeometryError::CollapsedTorso(torso_height));
    }

    let mid_x = anchors.midline_x();
    let top_y = anchors.shoulder_line_y();
    let right = anchors.right_direction();

    let targets = mode
        .sites()
        .iter()
        .zip(1u32..)
        .map(|(site, ordinal)| {
            let offset = (shoulder_width as f64 * site.column.fraction()) as i32;
            let toward = match site.side {
                Side::Right => right,
                Side::Left => -right,
            };
            let drop = (torso_height as f64 * site.level) as i32;
            AnatomicalTarget {
                name: site.name,
                description: site.description,
                position: PixelPoint::new(mid_x + toward * offset, top_y + drop),
                ordinal,
                side: site.side,
            }
        })
        .collect();

    Ok(TargetSet { mode, anchors, targets })
}

/// Wraps [`map_targets`] and falls back to the last good targets of the same
/// mode when a frame's geometry is degenerate.
#[derive(Debug, Default)]
pub struct StableMapper {
    last: Option<TargetSet>,
}

impl StableMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, pose: &Pose, mode: ExamMode, width: u32, height: u32) -> Option<&TargetSet> {
        match map_targets(pose, mode, width, height) {
            Ok(set) => {
                self.last = Some(set);
            }
            Err(e) => {
                log::debug!("[anatomy] degenerate torso geometry: {e}");
                if self.last.as_ref().is_some_and(|set| set.mode != mode) {
                    self.last = None;
                }
            }
        }
        self.last.as_ref()
    }

    pub fn clear(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Landmark, POSE_LANDMARK_COUNT};
    use std::collections::HashSet;

    const W: u32 = 1024;
    const H: u32 = 1024;

    /// Mirrored frontal pose: the right shoulder is on screen-left.
    fn mirrored_pose() -> Pose {
        pose_with(
            (0.625, 0.25),
            (0.375, 0.25),
            (0.59375, 0.75),
            (0.40625, 0.75),
        )
    }

    fn pose_with(ls: (f32, f32), rs: (f32, f32), lh: (f32, f32), rh: (f32, f32)) -> Pose {
        let mut landmarks = vec![Landmark::new(0.5, 0.5, 1.0); POSE_LANDMARK_COUNT];
        landmarks[PoseLandmark::LeftShoulder as usize] = Landmark::new(ls.0, ls.1, 1.0);
        landmarks[PoseLandmark::RightShoulder as usize] = Landmark::new(rs.0, rs.1, 1.0);
        landmarks[PoseLandmark::LeftHip as usize] = Landmark::new(lh.0, lh.1, 1.0);
        landmarks[PoseLandmark::RightHip as usize] = Landmark::new(rh.0, rh.1, 1.0);
        Pose::new(landmarks).unwrap()
    }

    fn position(set: &TargetSet, name: &str) -> (i32, i32) {
        let t = set.targets.iter().find(|t| t.name == name).unwrap();
        (t.position.x, t.position.y)
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("heart".parse::<ExamMode>(), Ok(ExamMode::Cardiac));
        assert_eq!("Cardiac".parse::<ExamMode>(), Ok(ExamMode::Cardiac));
        assert_eq!(" lung ".parse::<ExamMode>(), Ok(ExamMode::Lung));
        assert!("kidney".parse::<ExamMode>().is_err());
    }

    #[test]
    fn test_mode_toggle() {
        assert_eq!(ExamMode::Lung.toggled(), ExamMode::Cardiac);
        assert_eq!(ExamMode::Cardiac.toggled(), ExamMode::Lung);
    }

    #[test]
    fn test_anchor_geometry() {
        let anchors = TorsoAnchors::from_pose(&mirrored_pose(), W, H).unwrap();
        assert_eq!(anchors.shoulder_width(), 256);
        assert_eq!(anchors.torso_height(), 512);
        assert_eq!(anchors.midline_x(), 512);
        assert_eq!(anchors.shoulder_line_y(), 256);
    }

    #[test]
    fn test_target_counts_and_unique_names() {
        let pose = mirrored_pose();
        for (mode, count) in [(ExamMode::Lung, 7), (ExamMode::Cardiac, 5)] {
            let set = map_targets(&pose, mode, W, H).unwrap();
            assert_eq!(set.targets.len(), count);
            assert_eq!(mode.target_count(), count);
            let names: HashSet<_> = set.targets.iter().map(|t| t.name).collect();
            assert_eq!(names.len(), count);
            let ordinals: Vec<u32> = set.targets.iter().map(|t| t.ordinal).collect();
            assert_eq!(ordinals, (1..=count as u32).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_cardiac_positions() {
        let set = map_targets(&mirrored_pose(), ExamMode::Cardiac, W, H).unwrap();
        // stb = trunc(256 * 0.11) = 28, mcl = trunc(256 * 0.32) = 81
        assert_eq!(position(&set, "Aortic"), (484, 317));
        assert_eq!(position(&set, "Pulmonic"), (540, 317));
        assert_eq!(position(&set, "Erb's Pt"), (540, 363));
        assert_eq!(position(&set, "Tricuspid"), (540, 409));
        assert_eq!(position(&set, "Mitral"), (593, 455));
    }

    #[test]
    fn test_lung_positions() {
        let set = map_targets(&mirrored_pose(), ExamMode::Lung, W, H).unwrap();
        assert_eq!(position(&set, "R Apex"), (431, 271));
        assert_eq!(position(&set, "L Apex"), (593, 271));
        assert_eq!(position(&set, "R Upper"), (431, 327));
        assert_eq!(position(&set, "L Upper"), (593, 327));
        assert_eq!(position(&set, "R Middle"), (431, 419));
        assert_eq!(position(&set, "R Lower"), (431, 512));
        assert_eq!(position(&set, "L Lower"), (593, 512));
    }

    #[test]
    fn test_right_sites_follow_right_shoulder() {
        // Un-mirrored feed: the right shoulder is on screen-right.
        let pose = pose_with(
            (0.375, 0.25),
            (0.625, 0.25),
            (0.40625, 0.75),
            (0.59375, 0.75),
        );
        let set = map_targets(&pose, ExamMode::Cardiac, W, H).unwrap();
        assert_eq!(position(&set, "Aortic"), (540, 317));
        assert_eq!(position(&set, "Mitral"), (431, 455));
        for t in &set.targets {
            let right_of_midline = t.position.x > 512;
            assert_eq!(right_of_midline, t.side == Side::Right, "{}", t.name);
        }
    }

    #[test]
    fn test_mapping_is_idempotent() {
        let pose = mirrored_pose();
        for mode in [ExamMode::Lung, ExamMode::Cardiac] {
            assert_eq!(map_targets(&pose, mode, W, H), map_targets(&pose, mode, W, H));
        }
    }

    #[test]
    fn test_narrow_shoulders_rejected() {
        let pose = pose_with((0.5, 0.25), (0.5, 0.25), (0.5, 0.75), (0.5, 0.75));
        assert_eq!(
            map_targets(&pose, ExamMode::Lung, W, H),
            Err(GeometryError::NarrowShoulders(0))
        );
    }

    #[test]
    fn test_collapsed_torso_rejected() {
        let pose = pose_with((0.625, 0.75), (0.375, 0.75), (0.59375, 0.25), (0.40625, 0.25));
        assert!(matches!(
            map_targets(&pose, ExamMode::Cardiac, W, H),
            Err(GeometryError::CollapsedTorso(_))
        ));
    }

    #[test]
    fn test_non_finite_landmark_rejected() {
        let pose = pose_with((f32::NAN, 0.25), (0.375, 0.25), (0.59375, 0.75), (0.40625, 0.75));
        assert_eq!(
            map_targets(&pose, ExamMode::Cardiac, W, H),
            Err(GeometryError::NonFiniteLandmark("left shoulder"))
        );
    }

    #[test]
    fn test_far_off_frame_landmark_rejected() {
        let pose = pose_with((1.0e7, 0.25), (0.375, 0.25), (0.59375, 0.75), (0.40625, 0.75));
        assert_eq!(
            map_targets(&pose, ExamMode::Cardiac, 640, 480),
            Err(GeometryError::OutOfFrame("left shoulder"))
        );
        let pose = pose_with((0.625, 0.25), (0.375, -5.0), (0.59375, 0.75), (0.40625, 0.75));
        assert_eq!(
            map_targets(&pose, ExamMode::Lung, W, H),
            Err(GeometryError::OutOfFrame("right shoulder"))
        );
    }

    #[test]
    fn test_slightly_off_frame_landmark_still_maps() {
        // hips below the bottom edge are common when the camera is close
        let pose = pose_with((0.625, 0.25), (0.375, 0.25), (0.59375, 1.5), (0.40625, 1.5));
        assert!(map_targets(&pose, ExamMode::Cardiac, W, H).is_ok());
    }

    #[test]
    fn test_stable_mapper_reuses_last_good_targets() {
        let mut mapper = StableMapper::new();
        let good = mirrored_pose();
        let degenerate = pose_with((0.5, 0.25), (0.5, 0.25), (0.5, 0.75), (0.5, 0.75));

        let first = mapper.update(&good, ExamMode::Cardiac, W, H).cloned().unwrap();
        let reused = mapper.update(&degenerate, ExamMode::Cardiac, W, H).cloned();
        assert_eq!(reused, Some(first));
    }

    #[test]
    fn test_stable_mapper_skips_after_mode_change() {
        let mut mapper = StableMapper::new();
        let degenerate = pose_with((0.5, 0.25), (0.5, 0.25), (0.5, 0.75), (0.5, 0.75));

        assert!(mapper.update(&mirrored_pose(), ExamMode::Cardiac, W, H).is_some());
        assert!(mapper.update(&degenerate, ExamMode::Lung, W, H).is_none());
        assert!(mapper.update(&degenerate, ExamMode::Cardiac, W, H).is_none());
    }
}
