//! Output decoding for the MediaPipe BlazeFace short-range model.
//!
//! The model sees a 128x128 image and scores 896 SSD anchors. For each
//! anchor it regresses 16 values: box centre and size, then six keypoints
//! (eyes, nose tip, mouth centre, ear tragions), all in input pixels
//! relative to the anchor centre.

use ndarray::Array4;

use crate::detection::domain::points::{BoundingBox, FacePoints, Point2, PointsList};
use crate::shared::frame::Frame;

use super::math::{frame_to_nchw, sigmoid};

pub const INPUT_SIZE: usize = 128;
pub const NUM_ANCHORS: usize = 896;
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;

const NUM_COORDS: usize = 16;
const NUM_KEYPOINTS: usize = 6;
const KEYPOINT_OFFSET: usize = 4;
const STRIDES: [usize; 4] = [8, 16, 16, 16];
const SCORE_CLIP: f32 = 100.0;

/// The model's box is tight around the facial features; it is stretched
/// vertically to cover the whole head.
const HEAD_SCALE_Y: f32 = 2.0;

/// Two detections overlapping more than this are the same face.
const MERGE_IOU: f32 = 0.6;

/// SSD anchor centres in normalized input coordinates.
///
/// Consecutive layers sharing a stride share one feature map, with two
/// anchors per layer (the interpolated-scale anchor doubles each).
pub fn generate_anchors() -> Vec<Point2> {
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    let mut layer = 0;
    while layer < STRIDES.len() {
        let stride = STRIDES[layer];
        let same_stride = STRIDES[layer..].iter().take_while(|&&s| s == stride).count();
        let repeats = same_stride * 2;

        let grid = INPUT_SIZE / stride;
        for y in 0..grid {
            let cy = (y as f32 + 0.5) / grid as f32;
            for x in 0..grid {
                let cx = (x as f32 + 0.5) / grid as f32;
                anchors.extend(std::iter::repeat(Point2::new(cx, cy)).take(repeats));
            }
        }
        layer += same_stride;
    }
    anchors
}

/// RGB scaled to `[-1, 1]`, NCHW.
pub fn preprocess(frame: &Frame) -> Array4<f32> {
    frame_to_nchw(frame, INPUT_SIZE, |_, v| v as f32 / 127.5 - 1.0)
}

pub struct BlazefaceDecoder {
    anchors: Vec<Point2>,
    score_threshold: f32,
}

impl BlazefaceDecoder {
    pub fn new(score_threshold: f32) -> Self {
        Self {
            anchors: generate_anchors(),
            score_threshold,
        }
    }

    /// Turns raw `regressors` (`[896 x 16]`) and `scores` (`[896]`, logits)
    /// into faces in frame pixels: head box corners, then six keypoints.
    pub fn decode(&self, regressors: &[f32], scores: &[f32], width: u32, height: u32) -> PointsList {
        let fw = width as f32;
        let fh = height as f32;
        let scale = INPUT_SIZE as f32;
        let count = self
            .anchors
            .len()
            .min(scores.len())
            .min(regressors.len() / NUM_COORDS);

        let mut faces = PointsList::new();
        for (i, anchor) in self.anchors.iter().enumerate().take(count) {
            let score = sigmoid(scores[i].clamp(-SCORE_CLIP, SCORE_CLIP));
            if score < self.score_threshold {
                continue;
            }

            let reg = &regressors[i * NUM_COORDS..(i + 1) * NUM_COORDS];
            let cx = reg[0] / scale + anchor.x;
            let cy = reg[1] / scale + anchor.y;
            let w = reg[2] / scale;
            let h = reg[3] / scale;
            if w < 0.0 || h < 0.0 {
                continue;
            }

            let left = (cx - w / 2.0) * fw;
            let top = (cy - h / 2.0 * HEAD_SCALE_Y) * fh;
            if left < 0.0 || top < 0.0 {
                continue;
            }
            let right = (cx + w / 2.0) * fw;
            let bottom = (cy + h / 2.0 * HEAD_SCALE_Y) * fh;

            let keypoints = (0..NUM_KEYPOINTS).map(|k| {
                let at = KEYPOINT_OFFSET + k * 2;
                Point2::new(
                    (reg[at] / scale + anchor.x) * fw,
                    (reg[at + 1] / scale + anchor.y) * fh,
                )
            });
            faces.push(BoundingBox::new(left, top, right, bottom).with_landmarks(keypoints));
        }

        merge_overlapping(faces, MERGE_IOU)
    }
}

impl Default for BlazefaceDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_SCORE_THRESHOLD)
    }
}

/// Collapses detections of the same face, keeping the largest box.
pub fn merge_overlapping(faces: PointsList, iou_threshold: f32) -> PointsList {
    let mut kept: Vec<(BoundingBox, FacePoints)> = Vec::new();
    for face in faces {
        let Some(bbox) = BoundingBox::of_face(&face) else {
            continue;
        };
        match kept.iter_mut().find(|(k, _)| k.iou(&bbox) > iou_threshold) {
            Some(slot) => {
                if bbox.area() > slot.0.area() {
                    *slot = (bbox, face);
                }
            }
            None => kept.push((bbox, face)),
        }
    }
    kept.into_iter().map(|(_, face)| face).collect()
}
