pub mod json_landmark_detector;
pub mod onnx_yolo_landmark_detector;
