use crate::alignment::domain::alignment_error::AlignmentError;
use crate::alignment::domain::similarity_transform::SimilarityTransform;
use crate::shared::frame::Frame;

/// Resamples a frame through a similarity transform.
///
/// `transform` maps source coordinates to output coordinates. Every output
/// pixel of the `width` x `height` result is inverse-mapped into the source;
/// pixels landing outside the source stay zero.
pub trait FrameWarper: Send + Sync {
    fn warp(
        &self,
        frame: &Frame,
        transform: &SimilarityTransform,
        width: u32,
        height: u32,
    ) -> Result<Frame, AlignmentError>;
}
