use std::path::PathBuf;

use thiserror::Error;

use crate::detection::domain::detector_kind::DetectorKind;
use crate::detection::domain::points::PointsList;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector '{0}' is not available in this build")]
    Unavailable(DetectorKind),
    #[error("failed to load model {path}: {source}")]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Domain interface for face and landmark detection.
///
/// Implementations are slow and not reentrant, hence `&mut self`: a stage
/// keeps one instance per worker slot and never shares it between threads.
/// `rois` carries previously found face boxes for landmark detectors;
/// face detectors ignore it.
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame, rois: Option<&PointsList>)
        -> Result<PointsList, DetectorError>;
}
