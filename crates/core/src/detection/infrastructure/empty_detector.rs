use crate::detection::domain::detector::{Detector, DetectorError};
use crate::detection::domain::points::PointsList;
use crate::shared::frame::Frame;

/// Detects nothing. Used when no detector is configured or the configured
/// one cannot be built.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyDetector;

impl Detector for EmptyDetector {
    fn detect(
        &mut self,
        _frame: &Frame,
        _rois: Option<&PointsList>,
    ) -> Result<PointsList, DetectorError> {
        Ok(PointsList::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_nothing() {
        let mut detector = EmptyDetector;
        let faces = detector.detect(&Frame::blank(32, 32, 0), None).unwrap();
        assert!(faces.is_empty());
    }
}
