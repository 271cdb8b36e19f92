use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::concurrency::bounded_queue::BoundedQueue;
use crate::detection::domain::detector_kind::DetectorKind;
use crate::detection::infrastructure::detector_factory::{BuiltinDetectorFactory, DetectorFactory};
use crate::scheduling::domain::scheduling_policy::{FuncId, SchedParams};
use crate::scheduling::scheduler::{ScheduledFn, Scheduler, SchedulerError};
use crate::shared::config::TrackerConfig;
use crate::shared::frame::Frame;

use super::detect_faces_stage::DetectFacesStage;
use super::face_features_stage::FaceFeaturesStage;
use super::stage::{Detections, Stage};

/// Wires the face and landmark stages together through lossy queues.
///
/// ```text
/// submit_frame ─┬─> detect frames ──> DetectFacesStage ──> faces ─┬─> latest_faces
///               │                                                 │ (newest, peeked)
///               └─> feature frames ─> FaceFeaturesStage <─────────┘
///                                            └──> features ──> latest_features
/// ```
///
/// Every queue keeps only its newest entries: input frames beyond
/// `max_input_frames` are dropped oldest-first, and each stage trims its
/// own output. Frames are shared between the two stages behind an `Arc`.
pub struct FaceTrackingPipeline {
    detect_frames: Arc<BoundedQueue<Arc<Frame>>>,
    feature_frames: Arc<BoundedQueue<Arc<Frame>>>,
    faces: Arc<BoundedQueue<Detections>>,
    features: Arc<BoundedQueue<Detections>>,
    detect_stage: Arc<DetectFacesStage>,
    features_stage: Arc<FaceFeaturesStage>,
    detect_params: SchedParams,
    features_params: SchedParams,
    max_input_frames: usize,
    dropped_frames: AtomicUsize,
    last_faces: Option<Detections>,
    last_features: Option<Detections>,
}

impl FaceTrackingPipeline {
    pub fn new(config: &TrackerConfig, factory: Arc<dyn DetectorFactory>) -> Self {
        let detect_frames = Arc::new(BoundedQueue::new());
        let feature_frames = Arc::new(BoundedQueue::new());
        let faces = Arc::new(BoundedQueue::new());
        let features = Arc::new(BoundedQueue::new());

        let face_kind = DetectorKind::from_key(&config.face_detector);
        let mesh_kind = DetectorKind::from_key(&config.face_mesh);
        log::info!("Pipeline: faces with '{face_kind}', landmarks with '{mesh_kind}'");
        if mesh_kind != DetectorKind::Empty && !mesh_kind.is_landmark_detector() {
            log::warn!("Pipeline: '{mesh_kind}' finds face boxes, not landmarks");
        }

        let detect_stage = Arc::new(DetectFacesStage::new(
            face_kind,
            factory.clone(),
            detect_frames.clone(),
            faces.clone(),
            config.max_face_queue,
        ));
        let features_stage = Arc::new(FaceFeaturesStage::new(
            mesh_kind,
            factory,
            feature_frames.clone(),
            faces.clone(),
            features.clone(),
            config.max_feature_queue,
        ));

        Self {
            detect_frames,
            feature_frames,
            faces,
            features,
            detect_stage,
            features_stage,
            detect_params: SchedParams {
                weight: config.detect_weight,
                min_interval: Duration::from_millis(config.detect_min_interval_ms),
                max_interval: Duration::from_millis(config.detect_max_interval_ms),
            },
            features_params: SchedParams {
                weight: config.features_weight,
                min_interval: Duration::from_millis(config.features_min_interval_ms),
                max_interval: Duration::from_millis(config.features_max_interval_ms),
            },
            max_input_frames: config.max_input_frames.max(1),
            dropped_frames: AtomicUsize::new(0),
            last_faces: None,
            last_features: None,
        }
    }

    /// Pipeline using the detectors compiled into this build.
    pub fn from_config(config: &TrackerConfig) -> Self {
        let factory = Arc::new(BuiltinDetectorFactory::new(config.models.clone()));
        Self::new(config, factory)
    }

    /// Queues a captured frame for both stages, dropping the oldest queued
    /// frames beyond the input depth.
    pub fn submit_frame(&self, frame: Frame) {
        let frame = Arc::new(frame);
        self.detect_frames.push_back(frame.clone());
        self.feature_frames.push_back(frame);

        let dropped = self.detect_frames.trim_to(self.max_input_frames);
        self.feature_frames.trim_to(self.max_input_frames);
        if dropped > 0 {
            self.dropped_frames.fetch_add(dropped, Ordering::Relaxed);
            log::debug!("Pipeline: dropped {dropped} stale input frames");
        }
    }

    /// Newest face boxes that found at least one face.
    ///
    /// Older results are discarded, but the newest stays queued so the
    /// landmark stage can still read it as its region of interest.
    pub fn latest_faces(&mut self) -> Option<&Detections> {
        self.faces.trim_to(1);
        if let Some(newest) = self.faces.peek_back().filter(|d| !d.is_empty()) {
            self.last_faces = Some(newest);
        }
        self.last_faces.as_ref()
    }

    /// Newest landmarks; consumes everything queued.
    pub fn latest_features(&mut self) -> Option<&Detections> {
        if let Some(newest) = self.features.drain_to_latest().filter(|d| !d.is_empty()) {
            self.last_features = Some(newest);
        }
        self.last_features.as_ref()
    }

    /// Runs both stages on the calling thread, for single-threaded mode.
    pub fn run_inline(&self, slot: usize) {
        self.detect_stage.execute(slot);
        self.features_stage.execute(slot);
    }

    /// Registers one scheduled function per stage.
    pub fn register(&self, scheduler: &Scheduler) -> Result<Vec<FuncId>, SchedulerError> {
        let stages: [(Arc<dyn Stage>, SchedParams); 2] = [
            (self.detect_stage.clone(), self.detect_params),
            (self.features_stage.clone(), self.features_params),
        ];
        stages
            .into_iter()
            .map(|(stage, params)| {
                log::debug!("Pipeline: scheduling {} with {params:?}", stage.name());
                let func: ScheduledFn = Arc::new(move |slot| stage.execute(slot));
                scheduler.add_func(func, params)
            })
            .collect()
    }

    pub fn detect_stage(&self) -> &DetectFacesStage {
        &self.detect_stage
    }

    pub fn features_stage(&self) -> &FaceFeaturesStage {
        &self.features_stage
    }

    /// Input frames discarded before the face stage could see them.
    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// `(detect frames, feature frames, faces, features)` queue depths.
    pub fn queue_depths(&self) -> (usize, usize, usize, usize) {
        (
            self.detect_frames.len(),
            self.feature_frames.len(),
            self.faces.len(),
            self.features.len(),
        )
    }
}
