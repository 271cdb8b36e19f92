use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::constants::{
    DLIB_68_FACE_LANDMARKS_PATH, HAAR_CASCADE_PATH, MAX_FACE_QUEUE, MAX_FEATURE_QUEUE,
    MAX_INPUT_FRAMES, MEDIAPIPE_MODEL_PATH, RESNET_CAFFE_MODEL_PATH, RESNET_CAFFE_PROTO_TXT_PATH,
    YOLO_EFFNET_B0_PATH, YOLO_RESNET_18_PATH,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which admission policy the scheduler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Fair,
    Interval,
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyKind::Fair => write!(f, "fair"),
            PolicyKind::Interval => write!(f, "interval"),
        }
    }
}

impl std::str::FromStr for PolicyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fair" => Ok(PolicyKind::Fair),
            "interval" => Ok(PolicyKind::Interval),
            other => Err(ConfigError::Invalid(format!(
                "policy must be 'fair' or 'interval', got '{other}'"
            ))),
        }
    }
}

/// Model and cascade locations handed to detector constructors untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    pub haar_cascade: PathBuf,
    pub resnet_caffe_proto: PathBuf,
    pub resnet_caffe_model: PathBuf,
    pub yolo_resnet18: PathBuf,
    pub yolo_effnetb0: PathBuf,
    pub mediapipe: PathBuf,
    pub dlib_68: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            haar_cascade: PathBuf::from(HAAR_CASCADE_PATH),
            resnet_caffe_proto: PathBuf::from(RESNET_CAFFE_PROTO_TXT_PATH),
            resnet_caffe_model: PathBuf::from(RESNET_CAFFE_MODEL_PATH),
            yolo_resnet18: PathBuf::from(YOLO_RESNET_18_PATH),
            yolo_effnetb0: PathBuf::from(YOLO_EFFNET_B0_PATH),
            mediapipe: PathBuf::from(MEDIAPIPE_MODEL_PATH),
            dlib_68: PathBuf::from(DLIB_68_FACE_LANDMARKS_PATH),
        }
    }
}

/// Everything needed to wire and schedule the tracking pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub face_detector: String,
    pub face_mesh: String,
    pub workers: usize,
    pub policy: PolicyKind,
    pub max_input_frames: usize,
    pub max_face_queue: usize,
    pub max_feature_queue: usize,
    pub detect_weight: f64,
    pub features_weight: f64,
    pub detect_min_interval_ms: u64,
    pub detect_max_interval_ms: u64,
    pub features_min_interval_ms: u64,
    pub features_max_interval_ms: u64,
    pub models: ModelPaths,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            face_detector: "empty".to_string(),
            face_mesh: "empty".to_string(),
            workers: num_cpus::get().max(1),
            policy: PolicyKind::Fair,
            max_input_frames: MAX_INPUT_FRAMES,
            max_face_queue: MAX_FACE_QUEUE,
            max_feature_queue: MAX_FEATURE_QUEUE,
            detect_weight: 1.0,
            features_weight: 1.0,
            detect_min_interval_ms: 0,
            detect_max_interval_ms: 33,
            features_min_interval_ms: 0,
            features_max_interval_ms: 33,
            models: ModelPaths::default(),
        }
    }
}

impl TrackerConfig {
    /// Reads a JSON config file; absent fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: TrackerConfig =
            serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.max_input_frames == 0 || self.max_face_queue == 0 || self.max_feature_queue == 0 {
            return Err(ConfigError::Invalid(
                "queue depths must be at least 1".into(),
            ));
        }
        for (name, weight) in [
            ("detect_weight", self.detect_weight),
            ("features_weight", self.features_weight),
        ] {
            if !(weight.is_finite() && weight > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a positive number, got {weight}"
                )));
            }
        }
        if self.detect_min_interval_ms > self.detect_max_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "detect interval: min {}ms exceeds max {}ms",
                self.detect_min_interval_ms, self.detect_max_interval_ms
            )));
        }
        if self.features_min_interval_ms > self.features_max_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "features interval: min {}ms exceeds max {}ms",
                self.features_min_interval_ms, self.features_max_interval_ms
            )));
        }
        Ok(())
    }
}
