use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

use crate::alignment::domain::alignment_error::AlignmentError;
use crate::alignment::domain::frame_warper::FrameWarper;
use crate::alignment::domain::similarity_transform::SimilarityTransform;
use crate::shared::frame::Frame;

/// Bilinear resampling via `imageproc`, onto a zeroed RGB canvas.
pub struct BilinearWarper;

impl BilinearWarper {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BilinearWarper {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameWarper for BilinearWarper {
    fn warp(
        &self,
        frame: &Frame,
        transform: &SimilarityTransform,
        width: u32,
        height: u32,
    ) -> Result<Frame, AlignmentError> {
        let projection = Projection::from_matrix(transform.to_row_major_f32()).ok_or_else(|| {
            AlignmentError::DegenerateLandmarks("transform is not invertible".into())
        })?;
        let source = RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
            .ok_or_else(|| {
                AlignmentError::DegenerateLandmarks(format!(
                    "{} is not a {}x{} RGB buffer",
                    frame.name(),
                    frame.width(),
                    frame.height()
                ))
            })?;

        let mut out = RgbImage::new(width, height);
        warp_into(
            &source,
            &projection,
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
            &mut out,
        );

        Ok(Frame::new(out.into_raw(), width, height, 3, frame.index()).with_name(frame.name()))
    }
}
