use crate::detection::domain::landmark_set::LandmarkSet;

/// The anchor every frame of a run is aligned against.
///
/// Latched from the first frame that detects, fits and yields a usable
/// color, then never changed.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceState {
    landmarks: LandmarkSet,
    color: Vec<f64>,
    width: u32,
    height: u32,
}

impl ReferenceState {
    pub fn new(landmarks: LandmarkSet, color: Vec<f64>, width: u32, height: u32) -> Self {
        Self {
            landmarks,
            color,
            width,
            height,
        }
    }

    pub fn landmarks(&self) -> &LandmarkSet {
        &self.landmarks
    }

    /// Per-channel mean color every frame is scaled towards.
    pub fn color(&self) -> &[f64] {
        &self.color
    }

    /// Output `(width, height)` of every aligned frame.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
