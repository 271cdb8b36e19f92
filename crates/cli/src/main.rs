mod frame_source;

use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

use clap::Parser;

use facetrack_core::pipeline::face_tracking_pipeline::FaceTrackingPipeline;
use facetrack_core::pipeline::pipeline_logger::{PipelineLogger, StdoutPipelineLogger};
use facetrack_core::pipeline::stage::{Detections, Stage};
use facetrack_core::scheduling::scheduler::Scheduler;
use facetrack_core::shared::config::{PolicyKind, TrackerConfig};
use facetrack_core::shared::time_mark::TimeMark;

use frame_source::FrameSource;

const BLANK_WIDTH: u32 = 640;
const BLANK_HEIGHT: u32 = 480;

/// Slowest accepted capture rate: one frame every 100 seconds.
const MIN_FPS: f64 = 0.01;

/// Live face and landmark tracking over an image source.
#[derive(Parser)]
#[command(name = "facetrack")]
struct Cli {
    /// Image file or directory of images, looped as a camera feed.
    /// Blank frames are used when omitted.
    source: Option<PathBuf>,

    /// Face box detector: haar, hog, resnetCaffe, yoloResnet18, yoloEffnetb0, mediapipe, empty.
    #[arg(short = 'd', long)]
    face_detector: Option<String>,

    /// Landmark detector: dlib_68 or empty.
    #[arg(short = 'm', long)]
    face_mesh: Option<String>,

    /// Run stages on the worker pool instead of the capture thread.
    #[arg(short = 'j', long)]
    multithread: bool,

    /// Worker threads (defaults to the number of CPUs).
    #[arg(long)]
    workers: Option<usize>,

    /// Scheduling policy: fair or interval.
    #[arg(long)]
    policy: Option<PolicyKind>,

    /// JSON config file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frames to capture before exiting.
    #[arg(long, default_value = "300")]
    frames: usize,

    /// Capture rate in frames per second.
    #[arg(long, default_value = "30")]
    fps: f64,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;
    let config = build_config(&cli)?;

    let mut source = match &cli.source {
        Some(path) => FrameSource::open(path)?,
        None => FrameSource::blank(BLANK_WIDTH, BLANK_HEIGHT),
    };
    let mut pipeline = FaceTrackingPipeline::from_config(&config);
    let mut logger = StdoutPipelineLogger::default();

    let mut scheduler = if cli.multithread {
        let scheduler = match config.policy {
            PolicyKind::Fair => Scheduler::fair(config.workers)?,
            PolicyKind::Interval => Scheduler::interval(config.workers)?,
        };
        pipeline.register(&scheduler)?;
        Some(scheduler)
    } else {
        logger.info("Running stages inline on the capture thread");
        None
    };

    let frame_period = Duration::try_from_secs_f64(1.0 / cli.fps)?;
    let mut shown = ShownResults::default();

    for _ in 0..cli.frames {
        let tick = TimeMark::start();

        let frame = source.next_frame()?;
        logger.frame_submitted(frame.index(), cli.frames);
        pipeline.submit_frame(frame);

        match &scheduler {
            Some(scheduler) => {
                let admitted = scheduler.schedule();
                log::trace!("Admitted {admitted} stage run(s)");
            }
            None => pipeline.run_inline(0),
        }

        shown.update(&mut pipeline, &mut logger);

        let elapsed = tick.elapsed();
        if elapsed < frame_period {
            thread::sleep(frame_period - elapsed);
        }
    }

    if let Some(scheduler) = scheduler.as_mut() {
        scheduler.stop(true);
    }
    report_stages(&pipeline, &mut logger);
    logger.summary();
    Ok(())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.frames == 0 {
        return Err("--frames must be at least 1".into());
    }
    if !(cli.fps.is_finite() && cli.fps >= MIN_FPS) {
        return Err(format!("--fps must be a number of at least {MIN_FPS}, got {}", cli.fps).into());
    }
    if cli.workers == Some(0) {
        return Err("--workers must be at least 1".into());
    }
    Ok(())
}

fn build_config(cli: &Cli) -> Result<TrackerConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::default(),
    };
    if let Some(detector) = &cli.face_detector {
        config.face_detector = detector.clone();
    }
    if let Some(mesh) = &cli.face_mesh {
        config.face_mesh = mesh.clone();
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(policy) = cli.policy {
        config.policy = policy;
    }
    config.validate()?;
    Ok(config)
}

/// Frame indices of the results last shown, so each result is reported once.
#[derive(Default)]
struct ShownResults {
    faces: Option<usize>,
    features: Option<usize>,
}

impl ShownResults {
    fn update(&mut self, pipeline: &mut FaceTrackingPipeline, logger: &mut dyn PipelineLogger) {
        let (detect_frames, _, faces, features) = pipeline.queue_depths();
        logger.queue_depth("input", detect_frames);
        logger.queue_depth("faces", faces);
        logger.queue_depth("features", features);

        let detect_name = pipeline.detect_stage().name().to_string();
        let features_name = pipeline.features_stage().name().to_string();

        if let Some(latest) = pipeline.latest_faces() {
            show(&mut self.faces, &detect_name, latest, logger);
        }
        if let Some(latest) = pipeline.latest_features() {
            show(&mut self.features, &features_name, latest, logger);
        }
    }
}

fn show(last: &mut Option<usize>, stage: &str, latest: &Detections, logger: &mut dyn PipelineLogger) {
    if *last == Some(latest.frame_index) {
        return;
    }
    *last = Some(latest.frame_index);
    logger.stage_time(stage, latest.elapsed * 1000.0);
    logger.faces_shown(stage, latest.points.len());
    log::debug!(
        "{stage}: frame {} with {} face(s)",
        latest.frame_index,
        latest.points.len()
    );
}

fn report_stages(pipeline: &FaceTrackingPipeline, logger: &mut dyn PipelineLogger) {
    let detect = pipeline.detect_stage();
    let features = pipeline.features_stage();
    for (name, processed, failures, builds, average) in [
        (detect.name(), detect.processed(), detect.failures(), detect.detectors().builds(), detect.average_time()),
        (features.name(), features.processed(), features.failures(), features.detectors().builds(), features.average_time()),
    ] {
        logger.info(&format!(
            "{name}: {processed} result(s), {failures} failure(s), {builds} detector(s), avg {:.1}ms",
            average * 1000.0
        ));
    }
    logger.info(&format!("Dropped {} stale input frame(s)", pipeline.dropped_frames()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{ "face_detector": "haar", "workers": 2, "policy": "fair" }"#)
            .unwrap();
        let path = file.path().to_str().unwrap();

        let cli = Cli::parse_from(["facetrack", "--config", path, "-d", "mediapipe", "--policy", "interval"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.face_detector, "mediapipe");
        assert_eq!(config.workers, 2);
        assert_eq!(config.policy, PolicyKind::Interval);
    }

    #[test]
    fn test_defaults_without_flags() {
        let cli = Cli::parse_from(["facetrack"]);
        assert!(!cli.multithread);
        assert_eq!(cli.frames, 300);
        let config = build_config(&cli).unwrap();
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn test_unknown_policy_rejected_by_parser() {
        assert!(Cli::try_parse_from(["facetrack", "--policy", "cfs"]).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_frames_and_fps() {
        assert!(validate(&Cli::parse_from(["facetrack", "--frames", "0"])).is_err());
        assert!(validate(&Cli::parse_from(["facetrack", "--fps", "0"])).is_err());
        assert!(validate(&Cli::parse_from(["facetrack", "--fps", "1e-20"])).is_err());
        assert!(validate(&Cli::parse_from(["facetrack", "--fps", "inf"])).is_err());
        assert!(validate(&Cli::parse_from(["facetrack", "--fps", "0.5"])).is_ok());
        assert!(validate(&Cli::parse_from(["facetrack", "--workers", "0"])).is_err());
        assert!(validate(&Cli::parse_from(["facetrack", "-j", "--workers", "2"])).is_ok());
    }
}
