use crate::alignment::domain::alignment_error::AlignmentError;
use crate::alignment::domain::color_correction::{correct_color, mean_color};
use crate::alignment::domain::frame_warper::FrameWarper;
use crate::alignment::domain::reference_state::ReferenceState;
use crate::alignment::domain::similarity_transform::SimilarityTransform;
use crate::detection::domain::landmark_set::LandmarkSet;
use crate::masking::domain::face_mask::FaceMask;
use crate::shared::frame::Frame;

/// Registers frames, in time order, against the first frame that aligns.
///
/// Must be fed frames sequentially: whichever frame first succeeds becomes
/// the reference for the rest of the run.
pub struct FrameAligner {
    reference: Option<ReferenceState>,
    fixed_color: Option<Vec<f64>>,
}

impl FrameAligner {
    /// `fixed_color` replaces the reference frame's own mean color when set.
    pub fn new(fixed_color: Option<Vec<f64>>) -> Self {
        Self {
            reference: None,
            fixed_color,
        }
    }

    pub fn reference(&self) -> Option<&ReferenceState> {
        self.reference.as_ref()
    }

    /// Warp `frame` onto the reference pose and scale its colors to the
    /// reference color.
    pub fn align(
        &mut self,
        frame: &Frame,
        landmarks: &LandmarkSet,
        warper: &dyn FrameWarper,
    ) -> Result<Frame, AlignmentError> {
        if let Some(reference) = &self.reference {
            return align_to_reference(frame, landmarks, reference, warper);
        }

        let color = face_color(frame, landmarks)?;
        let candidate = ReferenceState::new(
            landmarks.clone(),
            self.fixed_color.clone().unwrap_or_else(|| color.clone()),
            frame.width(),
            frame.height(),
        );
        let aligned = warp_and_correct(frame, landmarks, &color, &candidate, warper)?;

        let (width, height) = candidate.size();
        log::info!(
            "Using {} as reference ({width}x{height}, color {:?})",
            frame.name(),
            candidate.color()
        );
        self.reference = Some(candidate);
        Ok(aligned)
    }
}

/// Align one frame against an already latched reference.
///
/// Stateless, so frames after the first can be aligned on any thread.
pub fn align_to_reference(
    frame: &Frame,
    landmarks: &LandmarkSet,
    reference: &ReferenceState,
    warper: &dyn FrameWarper,
) -> Result<Frame, AlignmentError> {
    let color = face_color(frame, landmarks)?;
    warp_and_correct(frame, landmarks, &color, reference, warper)
}

fn face_color(frame: &Frame, landmarks: &LandmarkSet) -> Result<Vec<f64>, AlignmentError> {
    let mask = FaceMask::from_landmarks(frame.width(), frame.height(), landmarks);
    mean_color(frame, &mask)
}

fn warp_and_correct(
    frame: &Frame,
    landmarks: &LandmarkSet,
    color: &[f64],
    reference: &ReferenceState,
    warper: &dyn FrameWarper,
) -> Result<Frame, AlignmentError> {
    let transform = SimilarityTransform::fit(reference.landmarks(), landmarks)?;
    let (width, height) = reference.size();
    let warped = warper.warp(frame, &transform, width, height)?;
    Ok(correct_color(&warped, color, reference.color()))
}
