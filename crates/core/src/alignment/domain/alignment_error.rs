use thiserror::Error;

/// Per-frame alignment failures. The frame is logged and skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignmentError {
    #[error("degenerate landmarks: {0}")]
    DegenerateLandmarks(String),
    #[error("face mask covers no usable color")]
    DegenerateColorMask,
}
