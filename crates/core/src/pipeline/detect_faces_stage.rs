use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::concurrency::bounded_queue::BoundedQueue;
use crate::concurrency::task_handle::panic_message;
use crate::detection::domain::detector_kind::DetectorKind;
use crate::detection::infrastructure::detector_factory::DetectorFactory;
use crate::shared::constants::{AVERAGE_ALPHA, INITIAL_DETECT_TIME};
use crate::shared::frame::Frame;
use crate::shared::time_mark::TimeMark;

use super::cost_estimate::CostEstimate;
use super::detector_cache::DetectorCache;
use super::stage::{Detections, Stage};

/// Finds face boxes in the freshest available frame.
///
/// Each pass drains the frame queue and keeps only its newest frame, so a
/// slow detector never works through a backlog. Results, including empty
/// ones, go to `output`, which is trimmed to `max_depth` newest entries.
/// A detector that errors or panics yields no output for that pass; a
/// panicking instance is dropped and rebuilt on the slot's next pass.
pub struct DetectFacesStage {
    detectors: DetectorCache,
    frames: Arc<BoundedQueue<Arc<Frame>>>,
    output: Arc<BoundedQueue<Detections>>,
    max_depth: usize,
    cost: CostEstimate,
    processed: AtomicUsize,
    failures: AtomicUsize,
    name: String,
}

impl DetectFacesStage {
    pub fn new(
        kind: DetectorKind,
        factory: Arc<dyn DetectorFactory>,
        frames: Arc<BoundedQueue<Arc<Frame>>>,
        output: Arc<BoundedQueue<Detections>>,
        max_depth: usize,
    ) -> Self {
        Self {
            detectors: DetectorCache::new(kind, factory),
            frames,
            output,
            max_depth: max_depth.max(1),
            cost: CostEstimate::new(INITIAL_DETECT_TIME, AVERAGE_ALPHA),
            processed: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            name: format!("detect_faces[{kind}]"),
        }
    }

    /// Frames run through the detector successfully.
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    /// Detector calls that returned an error or panicked.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn detectors(&self) -> &DetectorCache {
        &self.detectors
    }
}

impl Stage for DetectFacesStage {
    fn execute(&self, slot: usize) {
        let mut detector = self.detectors.check_out(slot);

        let Some(frame) = self.frames.drain_to_latest() else {
            log::debug!("{}: no frame available", self.name);
            return;
        };

        let mut timer = TimeMark::start();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| detector.detect(&frame, None)));
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
            Ok(points) => {
                self.processed.fetch_add(1, Ordering::Relaxed);
                self.output.push_back(Detections {
                    frame_index: frame.index(),
                    points,
                    elapsed,
                });
                let dropped = self.output.trim_to(self.max_depth);
                if dropped > 0 {
                    log::debug!("{}: dropped {dropped} stale results", self.name);
                }
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("{}: frame {} failed: {e}", self.name, frame.index());
            }
        }
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
    use crate::detection::domain::points::{BoundingBox, PointsList};
    use std::time::Duration;

    /// Reports one face box whose x coordinate is the frame index.
    struct IndexDetector {
        delay: Duration,
        fail: bool,
    }

    impl Detector for IndexDetector {
        fn detect(&mut self, frame: &Frame, _: Option<&PointsList>) -> Result<PointsList, DetectorError> {
            std::thread::sleep(self.delay);
            if self.fail {
                return Err(DetectorError::Inference("model exploded".into()));
            }
            let x = frame.index() as f32;
            Ok(vec![BoundingBox::new(x, 0.0, x + 1.0, 1.0).with_landmarks([])])
        }
    }

    struct IndexFactory {
        delay: Duration,
        fail: bool,
    }

    impl DetectorFactory for IndexFactory {
        fn create(&self, _: DetectorKind) -> Result<Box<dyn Detector>, DetectorError> {
            Ok(Box::new(IndexDetector {
                delay: self.delay,
                fail: self.fail,
            }))
        }
    }

    struct Fixture {
        stage: DetectFacesStage,
        frames: Arc<BoundedQueue<Arc<Frame>>>,
        output: Arc<BoundedQueue<Detections>>,
    }

    fn fixture(delay: Duration, fail: bool, max_depth: usize) -> Fixture {
        let frames = Arc::new(BoundedQueue::new());
        let output = Arc::new(BoundedQueue::new());
        let stage = DetectFacesStage::new(
            DetectorKind::Empty,
            Arc::new(IndexFactory { delay, fail }),
            frames.clone(),
            output.clone(),
            max_depth,
        );
        Fixture {
            stage,
            frames,
            output,
        }
    }

    fn push_frames(frames: &BoundedQueue<Arc<Frame>>, indices: std::ops::Range<usize>) {
        for i in indices {
            frames.push_back(Arc::new(Frame::blank(8, 8, i)));
        }
    }

    #[test]
    fn test_no_frame_is_a_noop() {
        let f = fixture(Duration::ZERO, false, 4);
        f.stage.execute(0);
        assert!(f.output.is_empty());
        assert_eq!(f.stage.processed(), 0);
        assert_eq!(f.stage.average_time(), INITIAL_DETECT_TIME);
    }

    #[test]
    fn test_processes_only_the_newest_frame() {
        let f = fixture(Duration::ZERO, false, 4);
        push_frames(&f.frames, 1..6);
        f.stage.execute(0);

        assert!(f.frames.is_empty());
        let result = f.output.try_pop_front().unwrap();
        assert_eq!(result.frame_index, 5);
        assert_eq!(result.points[0][0].x, 5.0);
        assert!(f.output.is_empty());
    }

    #[test]
    fn test_output_depth_keeps_newest() {
        let f = fixture(Duration::ZERO, false, 4);
        for i in 0..9 {
            push_frames(&f.frames, i..i + 1);
            f.stage.execute(0);
        }
        assert_eq!(f.output.len(), 4);
        let kept: Vec<_> = std::iter::from_fn(|| f.output.try_pop_front())
            .map(|d| d.frame_index)
            .collect();
        assert_eq!(kept, vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_average_time_moves_toward_measured_cost() {
        let f = fixture(Duration::from_millis(5), false, 4);
        push_frames(&f.frames, 0..1);
        f.stage.execute(0);
        let avg = f.stage.average_time();
        assert!(avg < INITIAL_DETECT_TIME);
        assert!(avg > INITIAL_DETECT_TIME * (1.0 - AVERAGE_ALPHA));
    }

    #[test]
    fn test_detector_error_produces_no_output() {
        let f = fixture(Duration::ZERO, true, 4);
        push_frames(&f.frames, 0..2);
        f.stage.execute(0);
        assert!(f.output.is_empty());
        assert_eq!(f.stage.failures(), 1);
        assert_eq!(f.stage.processed(), 0);
    }

    struct PanickingFactory;

    impl DetectorFactory for PanickingFactory {
        fn create(&self, _: DetectorKind) -> Result<Box<dyn Detector>, DetectorError> {
            Ok(Box::new(PanickingDetector))
        }
    }

    struct PanickingDetector;

    impl Detector for PanickingDetector {
        fn detect(&mut self, _: &Frame, _: Option<&PointsList>) -> Result<PointsList, DetectorError> {
            panic!("tensor shape mismatch");
        }
    }

    #[test]
    fn test_detector_panic_is_contained() {
        let frames = Arc::new(BoundedQueue::new());
        let output = Arc::new(BoundedQueue::new());
        let stage = DetectFacesStage::new(
            DetectorKind::Empty,
            Arc::new(PanickingFactory),
            frames.clone(),
            output.clone(),
            4,
        );

        for i in 0..2 {
            push_frames(&frames, i..i + 1);
            stage.execute(0);
        }

        assert!(output.is_empty());
        assert_eq!(stage.failures(), 2);
        assert_eq!(stage.processed(), 0);
        // The panicking instance is never parked, so each pass rebuilds it.
        assert_eq!(stage.detectors().cached(), 0);
        assert_eq!(stage.detectors().builds(), 2);
    }

    #[test]
    fn test_detector_built_once_per_slot() {
        let f = fixture(Duration::ZERO, false, 4);
        for i in 0..3 {
            push_frames(&f.frames, i..i + 1);
            f.stage.execute(0);
            push_frames(&f.frames, i..i + 1);
            f.stage.execute(1);
        }
        assert_eq!(f.stage.detectors().builds(), 2);
    }

    #[test]
    fn test_name_includes_detector_kind() {
        let f = fixture(Duration::ZERO, false, 4);
        assert_eq!(f.stage.name(), "detect_faces[empty]");
    }
}
