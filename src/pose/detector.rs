use anyhow::{Context, Result};
use opencv::core::Mat;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use super::crop::{hand_region, Letterbox, PixelRect};
use super::landmark::{Detection, Hand, Landmark, Pose, PoseLandmark, HAND_LANDMARK_COUNT, POSE_LANDMARK_COUNT};
use super::preprocess::letterbox_tensor;
use super::Detector;
use crate::camera::FrameImage;
use crate::config::DetectorConfig;

/// BlazePose landmark model input side
pub const POSE_INPUT_SIZE: i32 = 256;
/// Hand landmark model input side
pub const HAND_INPUT_SIZE: i32 = 224;

/// Values per pose landmark: x, y, z, visibility, presence
const POSE_STRIDE: usize = 5;
/// Values per hand landmark: x, y, z
const HAND_STRIDE: usize = 3;

fn build_session(path: &Path, what: &str) -> Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .commit_from_file(path)
        .with_context(|| format!("failed to load {what} model {}", path.display()))?;
    log::info!("[detector] {what} model loaded from {}", path.display());
    Ok(session)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Body pose plus up to two hands, from the ONNX exports of the BlazePose
/// full and hand landmark models.
///
/// The models are stateless, so the frame timestamp is only used for logging.
pub struct OnnxLandmarker {
    pose: Session,
    hand: Session,
    min_pose_presence: f32,
    min_hand_presence: f32,
    max_hands: usize,
}

impl OnnxLandmarker {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        Ok(Self {
            pose: build_session(&config.pose_model, "pose")?,
            hand: build_session(&config.hand_model, "hand")?,
            min_pose_presence: config.min_pose_presence,
            min_hand_presence: config.min_hand_presence,
            max_hands: config.max_hands.min(2),
        })
    }

    /// Input: [1, 256, 256, 3] RGB 0.0-1.0
    /// Output: Identity [1, 195] (39 x 5, input pixels), Identity_1 [1, 1] pose flag
    fn detect_pose(&mut self, frame: &Mat, frame_w: u32, frame_h: u32) -> Result<Option<Pose>> {
        let letterbox = Letterbox::fit(PixelRect::full(frame_w, frame_h), POSE_INPUT_SIZE);
        let input = Tensor::from_array(letterbox_tensor(frame, &letterbox)?)?;
        let outputs = self
            .pose
            .run(ort::inputs!["input_1" => input])
            .context("pose inference failed")?;

        let flag: ndarray::ArrayViewD<f32> = outputs["Identity_1"]
            .try_extract_array()
            .context("failed to extract pose flag")?;
        let presence = flag.iter().next().copied().unwrap_or(0.0);
        if presence < self.min_pose_presence {
            return Ok(None);
        }

        let raw: ndarray::ArrayViewD<f32> = outputs["Identity"]
            .try_extract_array()
            .context("failed to extract pose landmarks")?;
        let values: Vec<f32> = raw.iter().copied().collect();
        if values.len() < POSE_LANDMARK_COUNT * POSE_STRIDE {
            anyhow::bail!("pose output too short: {} values", values.len());
        }

        let landmarks = values
            .chunks_exact(POSE_STRIDE)
            .take(POSE_LANDMARK_COUNT)
            .map(|v| letterbox.to_landmark(v[0], v[1], sigmoid(v[3]), frame_w, frame_h))
            .collect();
        Ok(Some(Pose::new(landmarks)?))
    }

    /// Input: [1, 224, 224, 3] RGB 0.0-1.0
    /// Output: Identity [1, 63] (21 x 3, input pixels), Identity_1 [1, 1] hand flag
    fn detect_hand(&mut self, frame: &Mat, rect: PixelRect, frame_w: u32, frame_h: u32) -> Result<Option<Hand>> {
        let letterbox = Letterbox::fit(rect, HAND_INPUT_SIZE);
        let input = Tensor::from_array(letterbox_tensor(frame, &letterbox)?)?;
        let outputs = self
            .hand
            .run(ort::inputs!["input_1" => input])
            .context("hand inference failed")?;

        let flag: ndarray::ArrayViewD<f32> = outputs["Identity_1"]
            .try_extract_array()
            .context("failed to extract hand flag")?;
        let presence = flag.iter().next().copied().unwrap_or(0.0);
        if presence < self.min_hand_presence {
            return Ok(None);
        }

        let raw: ndarray::ArrayViewD<f32> = outputs["Identity"]
            .try_extract_array()
            .context("failed to extract hand landmarks")?;
        let landmarks: Vec<Landmark> = raw
            .iter()
            .copied()
            .collect::<Vec<f32>>()
            .chunks_exact(HAND_STRIDE)
            .take(HAND_LANDMARK_COUNT)
            .map(|v| letterbox.to_landmark(v[0], v[1], presence, frame_w, frame_h))
            .collect();
        Ok(Some(Hand::new(&landmarks)?))
    }
}

impl Detector<Mat> for OnnxLandmarker {
    fn detect(&mut self, image: &Mat, timestamp_ms: u64) -> Result<Detection> {
        let (frame_w, frame_h) = image.dimensions();
        let Some(pose) = self.detect_pose(image, frame_w, frame_h)? else {
            log::trace!("[detector] {timestamp_ms}ms: no pose");
            return Ok(Detection::empty());
        };

        // hands are searched around the wrists of the detected body
        let arms = [
            (PoseLandmark::LeftWrist, PoseLandmark::LeftIndex),
            (PoseLandmark::RightWrist, PoseLandmark::RightIndex),
        ];
        let mut hands = Vec::with_capacity(self.max_hands);
        for (wrist, index) in arms {
            if hands.len() >= self.max_hands {
                break;
            }
            let Some(rect) = hand_region(pose.get(wrist), pose.get(index), frame_w, frame_h) else {
                continue;
            };
            if let Some(hand) = self.detect_hand(image, rect, frame_w, frame_h)? {
                hands.push(hand);
            }
        }

        log::trace!("[detector] {timestamp_ms}ms: pose, {} hand(s)", hands.len());
        Ok(Detection {
            pose: Some(pose),
            hands,
        })
    }
}
