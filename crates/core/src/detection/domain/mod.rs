pub mod detector;
pub mod detector_kind;
pub mod points;
