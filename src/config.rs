use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::tracker::{ExamMode, DEFAULT_ALIGNMENT_RADIUS};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    /// OpenCV device index
    #[serde(default)]
    pub index: i32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Flip horizontally before detection (selfie view)
    #[serde(default = "default_true")]
    pub mirror: bool,
    /// Delay after a failed read
    #[serde(default = "default_read_backoff_ms")]
    pub read_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_pose_model")]
    pub pose_model: PathBuf,
    #[serde(default = "default_hand_model")]
    pub hand_model: PathBuf,
    /// Run detection on every n-th frame
    #[serde(default = "default_detect_every")]
    pub detect_every: u32,
    #[serde(default = "default_presence")]
    pub min_pose_presence: f32,
    #[serde(default = "default_presence")]
    pub min_hand_presence: f32,
    #[serde(default = "default_max_hands")]
    pub max_hands: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackingConfig {
    #[serde(default)]
    pub initial_mode: ExamMode,
    /// Max hand-to-target distance in pixels that counts as placed
    #[serde(default = "default_alignment_radius")]
    pub alignment_radius: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: i32,
    /// How long a feed client waits for a frame before rechecking shutdown
    #[serde(default = "default_frame_wait_ms")]
    pub frame_wait_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also write a timestamped log file here
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }
fn default_true() -> bool { true }
fn default_read_backoff_ms() -> u64 { 10 }
fn default_pose_model() -> PathBuf { PathBuf::from("models/pose_landmark_full.onnx") }
fn default_hand_model() -> PathBuf { PathBuf::from("models/hand_landmark_full.onnx") }
fn default_detect_every() -> u32 { 1 }
fn default_presence() -> f32 { 0.5 }
fn default_max_hands() -> usize { 2 }
fn default_alignment_radius() -> f32 { DEFAULT_ALIGNMENT_RADIUS }
fn default_listen_addr() -> String { "0.0.0.0:5050".to_string() }
fn default_jpeg_quality() -> i32 { 65 }
fn default_frame_wait_ms() -> u64 { 1000 }
fn default_log_level() -> String { "info".to_string() }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: default_width(),
            height: default_height(),
            mirror: default_true(),
            read_backoff_ms: default_read_backoff_ms(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            pose_model: default_pose_model(),
            hand_model: default_hand_model(),
            detect_every: default_detect_every(),
            min_pose_presence: default_presence(),
            min_hand_presence: default_presence(),
            max_hands: default_max_hands(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            initial_mode: ExamMode::default(),
            alignment_radius: default_alignment_radius(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            jpeg_quality: default_jpeg_quality(),
            frame_wait_ms: default_frame_wait_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("detector.detect_every must be at least 1")]
    ZeroDetectEvery,
    #[error("tracking.alignment_radius must be positive, got {0}")]
    NonPositiveRadius(f32),
    #[error("server.jpeg_quality must be within 1..=100, got {0}")]
    JpegQuality(i32),
    #[error("detector.max_hands must be at most 2, got {0}")]
    TooManyHands(usize),
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults. The
    /// flag tells whether the file was read.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<(Self, bool)> {
        let path = path.as_ref();
        if path.exists() {
            Ok((Self::load(path)?, true))
        } else {
            Ok((Self::default(), false))
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detector.detect_every == 0 {
            return Err(ConfigError::ZeroDetectEvery);
        }
        // also rejects NaN
        if !(self.tracking.alignment_radius > 0.0) {
            return Err(ConfigError::NonPositiveRadius(self.tracking.alignment_radius));
        }
        if !(1..=100).contains(&self.server.jpeg_quality) {
            return Err(ConfigError::JpegQuality(self.server.jpeg_quality));
        }
        if self.detector.max_hands > 2 {
            return Err(ConfigError::TooManyHands(self.detector.max_hands));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.camera.height, 480);
        assert!(config.camera.mirror);
        assert_eq!(config.detector.detect_every, 1);
        assert_eq!(config.detector.max_hands, 2);
        assert_eq!(config.tracking.initial_mode, ExamMode::Cardiac);
        assert_eq!(config.tracking.alignment_radius, 48.0);
        assert_eq!(config.server.listen_addr, "0.0.0.0:5050");
        assert_eq!(config.server.jpeg_quality, 65);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_section() {
        let config: Config = toml::from_str(
            r#"
            [tracking]
            initial_mode = "lung"

            [detector]
            detect_every = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.tracking.initial_mode, ExamMode::Lung);
        assert_eq!(config.tracking.alignment_radius, 48.0);
        assert_eq!(config.detector.detect_every, 2);
        assert_eq!(config.detector.min_pose_presence, 0.5);
    }

    #[test]
    fn test_cardiac_alias() {
        let config: Config = toml::from_str("[tracking]\ninitial_mode = \"cardiac\"").unwrap();
        assert_eq!(config.tracking.initial_mode, ExamMode::Cardiac);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(toml::from_str::<Config>("[tracking]\ninitial_mode = \"abdomen\"").is_err());
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        config.detector.detect_every = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroDetectEvery));

        let mut config = Config::default();
        config.tracking.alignment_radius = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::NonPositiveRadius(0.0)));

        let mut config = Config::default();
        config.server.jpeg_quality = 101;
        assert_eq!(config.validate(), Err(ConfigError::JpegQuality(101)));

        let mut config = Config::default();
        config.detector.max_hands = 3;
        assert_eq!(config.validate(), Err(ConfigError::TooManyHands(3)));
    }
}
