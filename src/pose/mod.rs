pub mod crop;
#[cfg(feature = "desktop")]
pub mod detector;
pub mod landmark;
#[cfg(feature = "desktop")]
pub mod preprocess;

#[cfg(feature = "desktop")]
pub use detector::OnnxLandmarker;
pub use landmark::{
    Detection, Hand, Landmark, LandmarkError, PixelPoint, Pose, PoseLandmark, HAND_LANDMARK_COUNT,
    PALM_CENTRE, POSE_LANDMARK_COUNT,
};

/// Body and hand landmark detector.
///
/// Called synchronously from the producer thread only. `timestamp_ms`
/// increases strictly from call to call.
pub trait Detector<I>: Send {
    fn detect(&mut self, image: &I, timestamp_ms: u64) -> anyhow::Result<Detection>;
}
