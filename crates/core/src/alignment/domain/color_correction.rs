use crate::alignment::domain::alignment_error::AlignmentError;
use crate::masking::domain::face_mask::FaceMask;
use crate::shared::frame::Frame;

/// Per-channel mean of the frame's pixels weighted by `mask`.
///
/// Fails when the mask is empty or any channel averages to zero, since
/// neither can be used as a correction divisor.
pub fn mean_color(frame: &Frame, mask: &FaceMask) -> Result<Vec<f64>, AlignmentError> {
    debug_assert_eq!(
        (frame.width(), frame.height()),
        (mask.width(), mask.height()),
        "mask must match frame dimensions"
    );
    let channels = frame.channels() as usize;
    let weight = mask.sum();
    if weight <= 0.0 {
        return Err(AlignmentError::DegenerateColorMask);
    }

    let pixels = frame.as_ndarray();
    let mut sums = vec![0.0f64; channels];
    for ((y, x), &m) in mask.view().indexed_iter() {
        if m == 0.0 {
            continue;
        }
        for (c, sum) in sums.iter_mut().enumerate() {
            *sum += pixels[[y, x, c]] as f64 * m as f64;
        }
    }

    let means: Vec<f64> = sums.into_iter().map(|s| s / weight).collect();
    if means.iter().any(|&m| m <= 0.0) {
        return Err(AlignmentError::DegenerateColorMask);
    }
    Ok(means)
}

/// Scale every sample by `reference / current` of its channel.
pub fn correct_color(frame: &Frame, current: &[f64], reference: &[f64]) -> Frame {
    let channels = frame.channels() as usize;
    debug_assert!(current.len() == channels && reference.len() == channels);
    let gains: Vec<f64> = reference
        .iter()
        .zip(current)
        .map(|(r, c)| r / c)
        .collect();

    let data = frame
        .data()
        .iter()
        .enumerate()
        .map(|(i, &v)| (v as f64 * gains[i % channels]).round().clamp(0.0, 255.0) as u8)
        .collect();

    Frame::new(data, frame.width(), frame.height(), frame.channels(), frame.index())
        .with_name(frame.name())
}
