use crate::detection::domain::detector::{Detector, DetectorError};
use crate::detection::domain::detector_kind::DetectorKind;
use crate::shared::config::ModelPaths;

use super::empty_detector::EmptyDetector;

/// Builds detector instances on demand. Stages call this once per worker
/// slot, from the worker thread that will own the instance.
pub trait DetectorFactory: Send + Sync {
    fn create(&self, kind: DetectorKind) -> Result<Box<dyn Detector>, DetectorError>;
}

/// Maps each [`DetectorKind`] to the implementation compiled into this
/// build. Model-backed detectors need the `onnx` feature; kinds with no
/// implementation report [`DetectorError::Unavailable`].
#[derive(Debug, Clone, Default)]
pub struct BuiltinDetectorFactory {
    models: ModelPaths,
}

impl BuiltinDetectorFactory {
    pub fn new(models: ModelPaths) -> Self {
        Self { models }
    }

    pub fn models(&self) -> &ModelPaths {
        &self.models
    }

    #[cfg(feature = "onnx")]
    fn create_model_backed(&self, kind: DetectorKind) -> Result<Box<dyn Detector>, DetectorError> {
        use super::blazeface_decoder::DEFAULT_SCORE_THRESHOLD;
        use super::grid_yolo_decoder::GridYoloDecoder;
        use super::onnx_blazeface_detector::OnnxBlazefaceDetector;
        use super::onnx_grid_yolo_detector::OnnxGridYoloDetector;

        match kind {
            DetectorKind::MediaPipe => Ok(Box::new(OnnxBlazefaceDetector::new(
                &self.models.mediapipe,
                DEFAULT_SCORE_THRESHOLD,
            )?)),
            DetectorKind::YoloResnet18 => Ok(Box::new(OnnxGridYoloDetector::new(
                &self.models.yolo_resnet18,
                GridYoloDecoder::default(),
            )?)),
            DetectorKind::YoloEffnetB0 => Ok(Box::new(OnnxGridYoloDetector::new(
                &self.models.yolo_effnetb0,
                GridYoloDecoder::default(),
            )?)),
            other => Err(DetectorError::Unavailable(other)),
        }
    }

    #[cfg(not(feature = "onnx"))]
    fn create_model_backed(&self, kind: DetectorKind) -> Result<Box<dyn Detector>, DetectorError> {
        Err(DetectorError::Unavailable(kind))
    }
}

impl DetectorFactory for BuiltinDetectorFactory {
    fn create(&self, kind: DetectorKind) -> Result<Box<dyn Detector>, DetectorError> {
        match kind {
            DetectorKind::Empty => Ok(Box::new(EmptyDetector)),
            DetectorKind::MediaPipe | DetectorKind::YoloResnet18 | DetectorKind::YoloEffnetB0 => {
                self.create_model_backed(kind)
            }
            DetectorKind::Haar
            | DetectorKind::Hog
            | DetectorKind::ResnetCaffe
            | DetectorKind::Dlib68 => Err(DetectorError::Unavailable(kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::frame::Frame;
    use rstest::rstest;
    use std::path::PathBuf;

    #[test]
    fn test_empty_is_always_available() {
        let factory = BuiltinDetectorFactory::default();
        let mut detector = factory.create(DetectorKind::Empty).unwrap();
        assert!(detector.detect(&Frame::blank(8, 8, 0), None).unwrap().is_empty());
    }

    #[rstest]
    #[case::haar(DetectorKind::Haar)]
    #[case::hog(DetectorKind::Hog)]
    #[case::resnet(DetectorKind::ResnetCaffe)]
    #[case::dlib(DetectorKind::Dlib68)]
    fn test_classic_detectors_are_unavailable(#[case] kind: DetectorKind) {
        let result = BuiltinDetectorFactory::default().create(kind);
        assert!(matches!(result, Err(DetectorError::Unavailable(k)) if k == kind));
    }

    #[cfg(not(feature = "onnx"))]
    #[rstest]
    #[case::mediapipe(DetectorKind::MediaPipe)]
    #[case::yolo_resnet(DetectorKind::YoloResnet18)]
    #[case::yolo_effnet(DetectorKind::YoloEffnetB0)]
    fn test_model_backed_detectors_need_onnx(#[case] kind: DetectorKind) {
        let result = BuiltinDetectorFactory::default().create(kind);
        assert!(matches!(result, Err(DetectorError::Unavailable(_))));
    }

    #[cfg(feature = "onnx")]
    #[test]
    fn test_missing_model_is_load_error() {
        let models = ModelPaths {
            mediapipe: PathBuf::from("/nonexistent/face_detection_short_range.onnx"),
            ..ModelPaths::default()
        };
        let result = BuiltinDetectorFactory::new(models).create(DetectorKind::MediaPipe);
        assert!(matches!(result, Err(DetectorError::ModelLoad { .. })));
    }

    #[test]
    fn test_keeps_configured_paths() {
        let models = ModelPaths {
            yolo_resnet18: PathBuf::from("models/yolo.onnx"),
            ..ModelPaths::default()
        };
        let factory = BuiltinDetectorFactory::new(models);
        assert_eq!(factory.models().yolo_resnet18, PathBuf::from("models/yolo.onnx"));
    }
}
