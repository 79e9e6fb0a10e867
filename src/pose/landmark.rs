use serde::Serialize;
use thiserror::Error;

/// Number of landmarks the body-pose model emits.
pub const POSE_LANDMARK_COUNT: usize = 33;

/// Number of landmarks per detected hand.
pub const HAND_LANDMARK_COUNT: usize = 21;

/// Body landmarks of the 33-point pose model that the tracker reads.
///
/// Left/right refer to the person's own body, not the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum PoseLandmark {
    Nose = 0,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftIndex = 19,
    RightIndex = 20,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
}

impl PoseLandmark {
    pub fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftShoulder => "left shoulder",
            Self::RightShoulder => "right shoulder",
            Self::LeftElbow => "left elbow",
            Self::RightElbow => "right elbow",
            Self::LeftWrist => "left wrist",
            Self::RightWrist => "right wrist",
            Self::LeftIndex => "left index finger",
            Self::RightIndex => "right index finger",
            Self::LeftHip => "left hip",
            Self::RightHip => "right hip",
            Self::LeftKnee => "left knee",
            Self::RightKnee => "right knee",
            Self::LeftAnkle => "left ankle",
            Self::RightAnkle => "right ankle",
        }
    }
}

/// Hand landmark standing in for the hand position (middle finger MCP joint).
pub const PALM_CENTRE: usize = 9;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LandmarkError {
    #[error("pose needs at least {POSE_LANDMARK_COUNT} landmarks, got {0}")]
    ShortPose(usize),
    #[error("hand needs {HAND_LANDMARK_COUNT} landmarks, got {0}")]
    ShortHand(usize),
}

/// A single normalized landmark
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    /// Normalized X (0.0..1.0 inside the image)
    pub x: f32,
    /// Normalized Y (0.0..1.0 inside the image)
    pub y: f32,
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, visibility: f32) -> Self {
        Self { x, y, visibility }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Convert to pixel coordinates, truncating toward zero.
    pub fn to_pixel(&self, width: u32, height: u32) -> PixelPoint {
        PixelPoint::new(
            (self.x * width as f32) as i32,
            (self.y * height as f32) as i32,
        )
    }
}

/// Integer pixel position in the processed (mirrored) frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &PixelPoint) -> f32 {
        let dx = (i64::from(self.x) - i64::from(other.x)) as f64;
        let dy = (i64::from(self.y) - i64::from(other.y)) as f64;
        dx.hypot(dy) as f32
    }
}

/// Body pose of one person
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    landmarks: Vec<Landmark>,
}

impl Pose {
    pub fn new(landmarks: Vec<Landmark>) -> Result<Self, LandmarkError> {
        if landmarks.len() < POSE_LANDMARK_COUNT {
            return Err(LandmarkError::ShortPose(landmarks.len()));
        }
        Ok(Self { landmarks })
    }

    pub fn get(&self, index: PoseLandmark) -> &Landmark {
        &self.landmarks[index as usize]
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }
}

/// One detected hand skeleton
#[derive(Debug, Clone, PartialEq)]
pub struct Hand {
    landmarks: [Landmark; HAND_LANDMARK_COUNT],
}

impl Hand {
    pub fn new(landmarks: &[Landmark]) -> Result<Self, LandmarkError> {
        let landmarks: [Landmark; HAND_LANDMARK_COUNT] = landmarks
            .try_into()
            .map_err(|_| LandmarkError::ShortHand(landmarks.len()))?;
        Ok(Self { landmarks })
    }

    pub fn landmarks(&self) -> &[Landmark; HAND_LANDMARK_COUNT] {
        &self.landmarks
    }

    pub fn palm_centre(&self) -> &Landmark {
        &self.landmarks[PALM_CENTRE]
    }
}

/// Result of running the detector on one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    pub pose: Option<Pose>,
    pub hands: Vec<Hand>,
}

impl Detection {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Palm-centre pixel of every hand whose centre landmark is usable.
    pub fn hand_centres(&self, width: u32, height: u32) -> Vec<PixelPoint> {
        self.hands
            .iter()
            .map(Hand::palm_centre)
            .filter(|lm| lm.is_finite())
            .map(|lm| lm.to_pixel(width, height))
            .collect()
    }
}
