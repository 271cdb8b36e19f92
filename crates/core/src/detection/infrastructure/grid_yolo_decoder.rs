//! Output decoding for the single-face 7x7 grid YOLO models
//! (`yoloResnet18`, `yoloEffnetb0`).
//!
//! Input is a 224x224 ImageNet-normalized RGB image. Output is one row per
//! grid cell: a face class score followed by four candidate boxes of
//! `(confidence, x, y, w, h)`. `x`/`y` are the box centre within its 32 px
//! cell, `w`/`h` are fractions of the input size.

use ndarray::Array4;

use crate::detection::domain::detector::DetectorError;
use crate::detection::domain::points::{BoundingBox, PointsList};
use crate::shared::frame::Frame;

use super::math::frame_to_nchw;

pub const INPUT_SIZE: usize = 224;
pub const GRID_SIZE: usize = 7;
pub const DEFAULT_CLASS_THRESHOLD: f32 = 0.5;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

const CELL_SIZE: f32 = (INPUT_SIZE / GRID_SIZE) as f32;
const NUM_CLASSES: usize = 1;
const BOXES_PER_CELL: usize = 4;
const FEATURES_PER_BOX: usize = 5;
const CELL_STRIDE: usize = NUM_CLASSES + BOXES_PER_CELL * FEATURES_PER_BOX;

/// Expected output length: `7 * 7 * (1 + 4 * 5)`.
pub const OUTPUT_LEN: usize = GRID_SIZE * GRID_SIZE * CELL_STRIDE;

const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

pub fn preprocess(frame: &Frame) -> Array4<f32> {
    frame_to_nchw(frame, INPUT_SIZE, |c, v| (v as f32 / 255.0 - MEAN[c]) / STD[c])
}

pub struct GridYoloDecoder {
    class_threshold: f32,
    confidence_threshold: f32,
}

impl GridYoloDecoder {
    pub fn new(class_threshold: f32, confidence_threshold: f32) -> Self {
        Self {
            class_threshold,
            confidence_threshold,
        }
    }

    /// Picks the most face-like cell, then its most confident box, and maps
    /// it to frame pixels. At most one face is reported.
    pub fn decode(&self, output: &[f32], width: u32, height: u32) -> Result<PointsList, DetectorError> {
        if output.len() < OUTPUT_LEN {
            return Err(DetectorError::Inference(format!(
                "grid YOLO output has {} values, expected {OUTPUT_LEN}",
                output.len()
            )));
        }

        let best_cell = (0..GRID_SIZE * GRID_SIZE)
            .map(|cell| (cell, output[cell * CELL_STRIDE]))
            .filter(|&(_, class)| class > self.class_threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let Some((cell, _)) = best_cell else {
            return Ok(PointsList::new());
        };

        let row = &output[cell * CELL_STRIDE..(cell + 1) * CELL_STRIDE];
        let best_box = row[NUM_CLASSES..]
            .chunks_exact(FEATURES_PER_BOX)
            .filter(|b| b[0] > self.confidence_threshold)
            .max_by(|a, b| a[0].total_cmp(&b[0]));
        let Some(candidate) = best_box else {
            return Ok(PointsList::new());
        };

        let cell_x = (cell % GRID_SIZE) as f32 * CELL_SIZE;
        let cell_y = (cell / GRID_SIZE) as f32 * CELL_SIZE;
        let box_w = candidate[3] * INPUT_SIZE as f32;
        let box_h = candidate[4] * INPUT_SIZE as f32;
        let left = candidate[1] * CELL_SIZE + cell_x - box_w / 2.0;
        let top = candidate[2] * CELL_SIZE + cell_y - box_h / 2.0;

        let sx = width as f32 / INPUT_SIZE as f32;
        let sy = height as f32 / INPUT_SIZE as f32;
        let bbox = BoundingBox::new(left * sx, top * sy, (left + box_w) * sx, (top + box_h) * sy);

        Ok(vec![bbox.with_landmarks([])])
    }
}

impl Default for GridYoloDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_CLASS_THRESHOLD, DEFAULT_CONFIDENCE_THRESHOLD)
    }
}
