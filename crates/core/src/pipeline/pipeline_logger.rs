use std::collections::BTreeMap;
use std::time::Instant;

/// Observer for the tracking loop: frame counts, stage costs, queue depths.
///
/// The loop reports through this trait so the CLI can print a run summary
/// while tests and embedders stay silent.
pub trait PipelineLogger: Send {
    /// A frame was handed to the pipeline. `total` is 0 for endless sources.
    fn frame_submitted(&mut self, index: usize, total: usize);

    /// Measured cost of one stage pass, in milliseconds.
    fn stage_time(&mut self, stage: &str, duration_ms: f64);

    /// Sampled depth of a named queue.
    fn queue_depth(&mut self, queue: &str, depth: usize);

    /// Number of faces in the newest result shown for `stage`.
    fn faces_shown(&mut self, stage: &str, faces: usize);

    fn info(&mut self, message: &str);

    /// End-of-run report. Default: no-op.
    fn summary(&self) {}
}

/// Discards every event.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn frame_submitted(&mut self, _index: usize, _total: usize) {}
    fn stage_time(&mut self, _stage: &str, _duration_ms: f64) {}
    fn queue_depth(&mut self, _queue: &str, _depth: usize) {}
    fn faces_shown(&mut self, _stage: &str, _faces: usize) {}
    fn info(&mut self, _message: &str) {}
}

#[derive(Default)]
struct Series {
    count: usize,
    sum: f64,
    max: f64,
}

impl Series {
    fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.max = self.max.max(value);
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Collects run statistics and reports them through the `log` crate.
///
/// Frame progress is logged every `throttle_frames` frames.
pub struct StdoutPipelineLogger {
    throttle_frames: usize,
    stage_times: BTreeMap<String, Series>,
    queue_depths: BTreeMap<String, Series>,
    faces: BTreeMap<String, Series>,
    start_time: Instant,
    frames: usize,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            stage_times: BTreeMap::new(),
            queue_depths: BTreeMap::new(),
            faces: BTreeMap::new(),
            start_time: Instant::now(),
            frames: 0,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Mean cost of a stage in milliseconds, if it ever reported.
    pub fn mean_stage_time(&self, stage: &str) -> Option<f64> {
        self.stage_times.get(stage).map(Series::mean)
    }

    pub fn max_queue_depth(&self, queue: &str) -> Option<usize> {
        self.queue_depths.get(queue).map(|s| s.max as usize)
    }

    /// Formatted report, or `None` before any frame was submitted.
    pub fn summary_string(&self) -> Option<String> {
        if self.frames == 0 {
            return None;
        }

        let elapsed = self.start_time.elapsed().as_secs_f64();
        let mut lines = vec![format!(
            "Tracking summary ({} frames, {elapsed:.1}s):",
            self.frames
        )];

        for (stage, times) in &self.stage_times {
            lines.push(format!(
                "  {stage:24}: {:5} passes  avg {:6.1}ms  max {:6.1}ms",
                times.count,
                times.mean(),
                times.max
            ));
        }
        for (queue, depths) in &self.queue_depths {
            lines.push(format!(
                "  queue {queue:18}: avg {:4.1}  max {}",
                depths.mean(),
                depths.max as usize
            ));
        }
        for (stage, faces) in &self.faces {
            lines.push(format!("  faces {stage:18}: avg {:.1}", faces.mean()));
        }
        if elapsed > 0.0 {
            lines.push(format!("  Input rate: {:.1} fps", self.frames as f64 / elapsed));
        }

        Some(lines.join("\n"))
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(30)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn frame_submitted(&mut self, index: usize, total: usize) {
        self.frames += 1;
        if self.frames % self.throttle_frames == 0 {
            if total > 0 {
                log::info!("Frame {index} ({}/{total})", self.frames);
            } else {
                log::info!("Frame {index}");
            }
        }
    }

    fn stage_time(&mut self, stage: &str, duration_ms: f64) {
        self.stage_times.entry(stage.to_string()).or_default().push(duration_ms);
    }

    fn queue_depth(&mut self, queue: &str, depth: usize) {
        self.queue_depths.entry(queue.to_string()).or_default().push(depth as f64);
    }

    fn faces_shown(&mut self, stage: &str, faces: usize) {
        self.faces.entry(stage.to_string()).or_default().push(faces as f64);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_null_logger_accepts_everything() {
        let mut logger = NullPipelineLogger;
        logger.frame_submitted(1, 10);
        logger.stage_time("detect_faces", 5.0);
        logger.queue_depth("faces", 3);
        logger.faces_shown("detect_faces", 1);
        logger.info("hello");
        logger.summary();
    }

    #[test]
    fn test_stage_time_mean() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.stage_time("detect_faces", 10.0);
        logger.stage_time("detect_faces", 20.0);
        logger.stage_time("detect_faces", 30.0);

        assert_relative_eq!(logger.mean_stage_time("detect_faces").unwrap(), 20.0);
        assert!(logger.mean_stage_time("face_features").is_none());
    }

    #[test]
    fn test_queue_depth_tracks_maximum() {
        let mut logger = StdoutPipelineLogger::new(10);
        for depth in [1, 8, 3] {
            logger.queue_depth("input", depth);
        }
        assert_eq!(logger.max_queue_depth("input"), Some(8));
    }

    #[test]
    fn test_frames_counted() {
        let mut logger = StdoutPipelineLogger::new(10);
        for i in 0..25 {
            logger.frame_submitted(i, 0);
        }
        assert_eq!(logger.frames(), 25);
    }

    #[test]
    fn test_summary_lists_stages_and_queues() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.frame_submitted(0, 1);
        logger.stage_time("detect_faces[mediapipe]", 12.0);
        logger.queue_depth("faces", 2);
        logger.faces_shown("detect_faces[mediapipe]", 1);

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("Tracking summary (1 frames"));
        assert!(summary.contains("detect_faces[mediapipe]"));
        assert!(summary.contains("queue faces"));
        assert!(summary.contains("fps"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        let logger = StdoutPipelineLogger::new(10);
        assert!(logger.summary_string().is_none());
    }

    #[test]
    fn test_throttle_never_zero() {
        let logger = StdoutPipelineLogger::new(0);
        assert_eq!(logger.throttle_frames, 1);
    }
}
