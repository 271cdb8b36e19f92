pub const HAAR_CASCADE_PATH: &str = "haarcascades/haarcascade_frontalface_default.xml";
pub const RESNET_CAFFE_PROTO_TXT_PATH: &str = "../res/Resnet_SSD_deploy.prototxt";
pub const RESNET_CAFFE_MODEL_PATH: &str = "../res/Res10_300x300_SSD_iter_140000.caffemodel";
pub const YOLO_RESNET_18_PATH: &str = "../res/YoloResnet18.onnx";
pub const YOLO_EFFNET_B0_PATH: &str = "../res/YoloEffnetb0.onnx";
pub const MEDIAPIPE_MODEL_PATH: &str = "../res/face_detection_short_range.onnx";
pub const DLIB_68_FACE_LANDMARKS_PATH: &str = "../res/shape_predictor_68_face_landmarks.dat";

/// Input frames kept before the oldest are dropped.
pub const MAX_INPUT_FRAMES: usize = 8;

/// Face-box results kept for the renderer and the landmark stage.
pub const MAX_FACE_QUEUE: usize = 4;

/// Landmark results kept for the renderer.
pub const MAX_FEATURE_QUEUE: usize = 2;

/// Smoothing factor for per-stage cost averages.
pub const AVERAGE_ALPHA: f64 = 0.1;

/// Cost assumed for a face detection pass before any measurement (seconds).
pub const INITIAL_DETECT_TIME: f64 = 0.5;

/// Cost assumed for a landmark pass before any measurement (seconds).
pub const INITIAL_FEATURES_TIME: f64 = 0.1;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
