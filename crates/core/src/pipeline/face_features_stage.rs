use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::concurrency::bounded_queue::BoundedQueue;
use crate::concurrency::task_handle::panic_message;
use crate::detection::domain::detector_kind::DetectorKind;
use crate::detection::domain::points::PointsList;
use crate::detection::infrastructure::detector_factory::DetectorFactory;
use crate::shared::constants::{AVERAGE_ALPHA, INITIAL_FEATURES_TIME};
use crate::shared::frame::Frame;
use crate::shared::time_mark::TimeMark;

use super::cost_estimate::CostEstimate;
use super::detector_cache::DetectorCache;
use super::stage::{Detections, Stage};

/// Refines face boxes into landmarks on the freshest available frame.
///
/// Regions of interest come from the face stage's output queue, read
/// without consuming so the renderer still sees them. When that queue is
/// empty, or its newest entry found no face, the last non-empty regions
/// are reused; before any face was ever seen the pass is a no-op. Empty
/// landmark results are not published, nor is anything after a detector
/// error or panic.
pub struct FaceFeaturesStage {
    detectors: DetectorCache,
    frames: Arc<BoundedQueue<Arc<Frame>>>,
    rois: Arc<BoundedQueue<Detections>>,
    output: Arc<BoundedQueue<Detections>>,
    max_depth: usize,
    cost: CostEstimate,
    last_roi: Mutex<Option<PointsList>>,
    processed: AtomicUsize,
    failures: AtomicUsize,
    name: String,
}

impl FaceFeaturesStage {
    pub fn new(
        kind: DetectorKind,
        factory: Arc<dyn DetectorFactory>,
        frames: Arc<BoundedQueue<Arc<Frame>>>,
        rois: Arc<BoundedQueue<Detections>>,
        output: Arc<BoundedQueue<Detections>>,
        max_depth: usize,
    ) -> Self {
        Self {
            detectors: DetectorCache::new(kind, factory),
            frames,
            rois,
            output,
            max_depth: max_depth.max(1),
            cost: CostEstimate::new(INITIAL_FEATURES_TIME, AVERAGE_ALPHA),
            last_roi: Mutex::new(None),
            processed: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            name: format!("face_features[{kind}]"),
        }
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn detectors(&self) -> &DetectorCache {
        &self.detectors
    }

    fn current_roi(&self) -> Option<PointsList> {
        let mut last = self.last_roi.lock();
        match self.rois.peek_back() {
            Some(newest) if !newest.is_empty() => {
                *last = Some(newest.points.clone());
                Some(newest.points)
            }
            _ => last.clone(),
        }
    }
}

impl Stage for FaceFeaturesStage {
    fn execute(&self, slot: usize) {
        let mut detector = self.detectors.check_out(slot);

        let Some(frame) = self.frames.drain_to_latest() else {
            log::debug!("{}: no frame available", self.name);
            return;
        };
        let Some(roi) = self.current_roi() else {
            log::debug!("{}: no face seen yet", self.name);
            return;
        };

        let mut timer = TimeMark::start();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| detector.detect(&frame, Some(&roi))));
        let elapsed = timer.mark();
        self.cost.record(elapsed);

        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                detector.discard();
                self.failures.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "{}: detector panicked on frame {}: {}",
                    self.name,
                    frame.index(),
                    panic_message(payload.as_ref())
                );
                return;
            }
        };

        match result {
            Ok(points) if points.is_empty() => {
                log::debug!("{}: no features on frame {}", self.name, frame.index());
            }
            Ok(points) => {
                self.processed.fetch_add(1, Ordering::Relaxed);
                self.output.push_back(Detections {
                    frame_index: frame.index(),
                    points,
                    elapsed,
                });
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("{}: frame {} failed: {e}", self.name, frame.index());
            }
        }
        self.output.trim_to(self.max_depth);
    }

    fn average_time(&self) -> f64 {
        self.cost.get()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detector::{Detector, DetectorError};
    use crate::detection::domain::points::{face_boxes, BoundingBox, Point2};

    /// Emits the centre of every region of interest as a landmark.
    struct CentreDetector;

    impl Detector for CentreDetector {
        fn detect(&mut self, _: &Frame, rois: Option<&PointsList>) -> Result<PointsList, DetectorError> {
            let Some(rois) = rois else {
                return Ok(PointsList::new());
            };
            Ok(face_boxes(rois)
                .iter()
                .map(|b| {
                    let centre = Point2::new(b.min.x + b.width() / 2.0, b.min.y + b.height() / 2.0);
                    b.with_landmarks([centre])
                })
                .collect())
        }
    }

    struct CentreFactory;

    impl DetectorFactory for CentreFactory {
        fn create(&self, _: DetectorKind) -> Result<Box<dyn Detector>, DetectorError> {
            Ok(Box::new(CentreDetector))
        }
    }

    struct Fixture {
        stage: FaceFeaturesStage,
        frames: Arc<BoundedQueue<Arc<Frame>>>,
        rois: Arc<BoundedQueue<Detections>>,
        output: Arc<BoundedQueue<Detections>>,
    }

    fn fixture() -> Fixture {
        let frames = Arc::new(BoundedQueue::new());
        let rois = Arc::new(BoundedQueue::new());
        let output = Arc::new(BoundedQueue::new());
        let stage = FaceFeaturesStage::new(
            DetectorKind::Dlib68,
            Arc::new(CentreFactory),
            frames.clone(),
            rois.clone(),
            output.clone(),
            2,
        );
        Fixture {
            stage,
            frames,
            rois,
            output,
        }
    }

    fn faces(frame_index: usize, x: f32) -> Detections {
        Detections {
            frame_index,
            points: vec![BoundingBox::new(x, 0.0, x + 10.0, 10.0).with_landmarks([])],
            elapsed: 0.0,
        }
    }

    fn no_faces(frame_index: usize) -> Detections {
        Detections {
            frame_index,
            points: PointsList::new(),
            elapsed: 0.0,
        }
    }

    fn push_frame(f: &Fixture, index: usize) {
        f.frames.push_back(Arc::new(Frame::blank(8, 8, index)));
    }

    #[test]
    fn test_noop_before_any_face() {
        let f = fixture();
        push_frame(&f, 0);
        f.stage.execute(0);
        assert!(f.output.is_empty());
        assert_eq!(f.stage.average_time(), INITIAL_FEATURES_TIME);
    }

    #[test]
    fn test_uses_newest_roi_without_consuming_it() {
        let f = fixture();
        f.rois.push_back(faces(1, 0.0));
        f.rois.push_back(faces(2, 100.0));
        push_frame(&f, 3);
        f.stage.execute(0);

        assert_eq!(f.rois.len(), 2);
        let result = f.output.try_pop_front().unwrap();
        assert_eq!(result.frame_index, 3);
        assert_eq!(result.points[0][2], Point2::new(105.0, 5.0));
    }

    #[test]
    fn test_reuses_last_roi_when_queue_drained() {
        let f = fixture();
        f.rois.push_back(faces(1, 20.0));
        push_frame(&f, 1);
        f.stage.execute(0);
        f.output.clear();

        f.rois.clear();
        push_frame(&f, 2);
        f.stage.execute(0);
        let result = f.output.try_pop_front().unwrap();
        assert_eq!(result.frame_index, 2);
        assert_eq!(result.points[0][2], Point2::new(25.0, 5.0));
    }

    #[test]
    fn test_empty_roi_falls_back_to_last_face() {
        let f = fixture();
        f.rois.push_back(faces(1, 40.0));
        push_frame(&f, 1);
        f.stage.execute(0);

        f.rois.push_back(no_faces(2));
        push_frame(&f, 2);
        f.stage.execute(0);
        let newest = f.output.peek_back().unwrap();
        assert_eq!(newest.frame_index, 2);
        assert_eq!(newest.points[0][2], Point2::new(45.0, 5.0));
    }

    #[test]
    fn test_output_depth_is_bounded() {
        let f = fixture();
        f.rois.push_back(faces(0, 0.0));
        for i in 0..6 {
            push_frame(&f, i);
            f.stage.execute(0);
        }
        assert_eq!(f.output.len(), 2);
        assert_eq!(f.output.peek_front().unwrap().frame_index, 4);
        assert_eq!(f.stage.processed(), 6);
    }

    #[test]
    fn test_no_frame_is_a_noop() {
        let f = fixture();
        f.rois.push_back(faces(0, 0.0));
        f.stage.execute(0);
        assert!(f.output.is_empty());
    }

    #[test]
    fn test_empty_landmark_result_is_not_published() {
        let f = fixture();
        f.rois.push_back(Detections {
            frame_index: 0,
            points: vec![vec![Point2::new(1.0, 1.0)]],
            elapsed: 0.0,
        });
        push_frame(&f, 1);
        f.stage.execute(0);
        assert!(f.output.is_empty());
        assert_eq!(f.stage.processed(), 0);
        assert_eq!(f.stage.failures(), 0);
    }

    struct PanickingDetector;

    impl Detector for PanickingDetector {
        fn detect(&mut self, _: &Frame, _: Option<&PointsList>) -> Result<PointsList, DetectorError> {
            panic!("landmark index out of range");
        }
    }

    struct PanickingFactory;

    impl DetectorFactory for PanickingFactory {
        fn create(&self, _: DetectorKind) -> Result<Box<dyn Detector>, DetectorError> {
            Ok(Box::new(PanickingDetector))
        }
    }

    #[test]
    fn test_detector_panic_is_contained() {
        let f = fixture();
        let stage = FaceFeaturesStage::new(
            DetectorKind::Dlib68,
            Arc::new(PanickingFactory),
            f.frames.clone(),
            f.rois.clone(),
            f.output.clone(),
            2,
        );
        f.rois.push_back(faces(0, 0.0));
        push_frame(&f, 1);
        stage.execute(0);

        assert!(f.output.is_empty());
        assert_eq!(stage.failures(), 1);
        assert_eq!(stage.detectors().cached(), 0);
        // The region of interest is still available for the next pass.
        assert_eq!(f.rois.len(), 1);
    }
}
