pub mod landmark_detector;
pub mod landmark_set;
