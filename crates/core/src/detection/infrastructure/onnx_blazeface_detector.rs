use std::path::Path;

use crate::detection::domain::detector::{Detector, DetectorError};
use crate::detection::domain::points::PointsList;
use crate::shared::frame::Frame;

use super::blazeface_decoder::{self, BlazefaceDecoder};

/// MediaPipe BlazeFace short-range detector backed by an ONNX Runtime
/// session. Produces head boxes plus six facial keypoints per face.
pub struct OnnxBlazefaceDetector {
    session: ort::session::Session,
    decoder: BlazefaceDecoder,
}

impl OnnxBlazefaceDetector {
    pub fn new(model_path: &Path, score_threshold: f32) -> Result<Self, DetectorError> {
        let session = ort::session::Session::builder()
            .and_then(|builder| builder.commit_from_file(model_path))
            .map_err(|e| DetectorError::ModelLoad {
                path: model_path.to_path_buf(),
                source: e.to_string().into(),
            })?;
        log::info!("Loaded BlazeFace model from {}", model_path.display());
        Ok(Self {
            session,
            decoder: BlazefaceDecoder::new(score_threshold),
        })
    }
}

impl Detector for OnnxBlazefaceDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        _rois: Option<&PointsList>,
    ) -> Result<PointsList, DetectorError> {
        if frame.is_empty() {
            return Ok(PointsList::new());
        }

        let input = ort::value::Tensor::from_array(blazeface_decoder::preprocess(frame))
            .map_err(inference_error)?;
        let outputs = self
            .session
            .run(ort::inputs![input])
            .map_err(inference_error)?;

        // regressors: [1, 896, 16], classificators: [1, 896, 1]
        if outputs.len() < 2 {
            return Err(DetectorError::Inference(format!(
                "BlazeFace model expected 2 outputs, got {}",
                outputs.len()
            )));
        }
        let regressors = outputs[0]
            .try_extract_array::<f32>()
            .map_err(inference_error)?;
        let scores = outputs[1]
            .try_extract_array::<f32>()
            .map_err(inference_error)?;
        let (Some(regressors), Some(scores)) = (regressors.as_slice(), scores.as_slice()) else {
            return Err(DetectorError::Inference(
                "BlazeFace outputs are not contiguous".into(),
            ));
        };

        Ok(self
            .decoder
            .decode(regressors, scores, frame.width(), frame.height()))
    }
}

pub(crate) fn inference_error(e: impl std::fmt::Display) -> DetectorError {
    DetectorError::Inference(e.to_string())
}
