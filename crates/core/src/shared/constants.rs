pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// Number of keypoints the YOLO face model emits per face.
pub const YOLO_LANDMARK_COUNT: usize = 5;

pub const APP_NAME: &str = "facelapse";
pub const CONFIG_FILE_NAME: &str = "facelapse.conf";

/// Pixel L2 distance at or below which a frame counts as a duplicate.
pub const DEFAULT_IMG_THRESH: f64 = 2000.0;

/// Frames per layer; output length is roughly input length / frame skip.
pub const DEFAULT_FRAME_SKIP: usize = 10;

/// Gaussian kernel size used to erode the comparison mask.
pub const DEFAULT_ERODE_AMOUNT: usize = 101;

/// Blurred mask values above this stay inside the eroded mask.
pub const ERODE_THRESHOLD: f32 = 0.99;

/// Minimum face score for the YOLO model.
pub const DEFAULT_CONFIDENCE: f64 = 0.25;

pub const DEFAULT_ALIGNED_PATH: &str = "aligned";
pub const DEFAULT_OUT_EXTENSION: &str = "jpg";
pub const DEFAULT_FILTERED_FILES: &str = "files.txt";
/// Written next to the aligned frames; read back by `framedrop`.
pub const REFERENCE_FILE_NAME: &str = "reference.json";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
