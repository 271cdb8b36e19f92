pub mod blazeface_decoder;
pub mod detector_factory;
pub mod empty_detector;
pub mod grid_yolo_decoder;
pub mod math;
#[cfg(feature = "onnx")]
pub mod onnx_blazeface_detector;
#[cfg(feature = "onnx")]
pub mod onnx_grid_yolo_detector;
