pub mod cost_estimate;
pub mod detect_faces_stage;
pub mod detector_cache;
pub mod face_features_stage;
pub mod face_tracking_pipeline;
pub mod pipeline_logger;
pub mod stage;
