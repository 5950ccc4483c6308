use thiserror::Error;

use crate::detection::domain::landmark_set::LandmarkSet;
use crate::shared::frame::Frame;

/// Why a frame produced no usable landmark set.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error("no faces detected")]
    NoFaceDetected,
    #[error("{0} faces detected, expected exactly one")]
    MultipleFacesDetected(usize),
    #[error("located {found} of {expected} landmarks")]
    IncompleteLandmarks { found: usize, expected: usize },
    #[error("landmark backend failed: {0}")]
    Backend(String),
}

impl DetectionError {
    /// Expected per-frame outcomes: the frame is skipped and the run goes on.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DetectionError::Backend(_))
    }
}

/// Domain interface for the external landmark model.
///
/// Returns exactly one landmark set of the detector's fixed cardinality, or
/// the reason the frame cannot be used. Implementations may hold mutable
/// inference state, hence `&mut self`.
pub trait LandmarkDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<LandmarkSet, DetectionError>;
}

/// Builds one detector per worker thread.
pub type LandmarkDetectorFactory = Box<
    dyn Fn() -> Result<Box<dyn LandmarkDetector>, Box<dyn std::error::Error + Send + Sync>>
        + Send
        + Sync,
>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::no_face(DetectionError::NoFaceDetected, true)]
    #[case::many_faces(DetectionError::MultipleFacesDetected(2), true)]
    #[case::incomplete(DetectionError::IncompleteLandmarks { found: 3, expected: 5 }, true)]
    #[case::backend(DetectionError::Backend("session crashed".into()), false)]
    fn test_recoverability(#[case] err: DetectionError, #[case] recoverable: bool) {
        assert_eq!(err.is_recoverable(), recoverable);
    }

    #[test]
    fn test_messages() {
        assert_eq!(DetectionError::NoFaceDetected.to_string(), "no faces detected");
        assert_eq!(
            DetectionError::MultipleFacesDetected(3).to_string(),
            "3 faces detected, expected exactly one"
        );
    }
}
