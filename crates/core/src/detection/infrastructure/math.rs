//! Shared numeric helpers for the model-backed detectors.

use ndarray::Array4;

use crate::shared::frame::Frame;

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Nearest-neighbour resize of `frame` into a `1 x 3 x size x size` tensor.
///
/// `normalize(channel, value)` maps each source byte to the model's input
/// range. Single-channel frames are replicated across the three planes.
pub fn frame_to_nchw(frame: &Frame, size: usize, normalize: impl Fn(usize, u8) -> f32) -> Array4<f32> {
    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let last_channel = (frame.channels() as usize).saturating_sub(1);

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    if src_h == 0 || src_w == 0 {
        return tensor;
    }

    for y in 0..size {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / size as f64) as usize).min(src_h - 1);
        for x in 0..size {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / size as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = normalize(c, src[[src_y, src_x, c.min(last_channel)]]);
            }
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sigmoid() {
        assert_relative_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(10.0) > 0.999);
        assert!(sigmoid(-10.0) < 0.001);
    }

    #[test]
    fn test_frame_to_nchw_shape_and_values() {
        let frame = Frame::new(vec![255u8; 40 * 20 * 3], 40, 20, 3, 0);
        let tensor = frame_to_nchw(&frame, 16, |_, v| v as f32 / 255.0);
        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);
        assert_relative_eq!(tensor[[0, 2, 15, 15]], 1.0);
    }

    #[test]
    fn test_frame_to_nchw_grayscale_replicates_plane() {
        let frame = Frame::new(vec![51u8; 8 * 8], 8, 8, 1, 0);
        let tensor = frame_to_nchw(&frame, 4, |_, v| v as f32);
        for c in 0..3 {
            assert_relative_eq!(tensor[[0, c, 1, 1]], 51.0);
        }
    }

    #[test]
    fn test_frame_to_nchw_passes_channel_index() {
        let frame = Frame::blank(4, 4, 0);
        let tensor = frame_to_nchw(&frame, 2, |c, _| c as f32);
        assert_relative_eq!(tensor[[0, 0, 0, 0]], 0.0);
        assert_relative_eq!(tensor[[0, 2, 1, 1]], 2.0);
    }
}
