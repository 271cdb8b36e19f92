use std::path::Path;

use crate::detection::domain::detector::{Detector, DetectorError};
use crate::detection::domain::points::PointsList;
use crate::shared::frame::Frame;

use super::grid_yolo_decoder::{self, GridYoloDecoder};
use super::onnx_blazeface_detector::inference_error;

/// Single-face grid YOLO detector (ResNet-18 or EfficientNet-B0 backbone)
/// backed by an ONNX Runtime session.
pub struct OnnxGridYoloDetector {
    session: ort::session::Session,
    decoder: GridYoloDecoder,
}

impl OnnxGridYoloDetector {
    pub fn new(model_path: &Path, decoder: GridYoloDecoder) -> Result<Self, DetectorError> {
        let session = ort::session::Session::builder()
            .and_then(|builder| builder.commit_from_file(model_path))
            .map_err(|e| DetectorError::ModelLoad {
                path: model_path.to_path_buf(),
                source: e.to_string().into(),
            })?;
        log::info!("Loaded grid YOLO model from {}", model_path.display());
        Ok(Self { session, decoder })
    }
}

impl Detector for OnnxGridYoloDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        _rois: Option<&PointsList>,
    ) -> Result<PointsList, DetectorError> {
        if frame.is_empty() {
            return Ok(PointsList::new());
        }

        let input = ort::value::Tensor::from_array(grid_yolo_decoder::preprocess(frame))
            .map_err(inference_error)?;
        let outputs = self
            .session
            .run(ort::inputs![input])
            .map_err(inference_error)?;
        if outputs.len() == 0 {
            return Err(DetectorError::Inference(
                "grid YOLO model produced no outputs".into(),
            ));
        }

        let tensor = outputs[0]
            .try_extract_array::<f32>()
            .map_err(inference_error)?;
        let data = tensor.as_slice().ok_or_else(|| {
            DetectorError::Inference("grid YOLO output is not contiguous".into())
        })?;

        self.decoder.decode(data, frame.width(), frame.height())
    }
}
