//! Ordered, fixed-cardinality facial keypoints for one frame.
//!
//! Point `i` of every set produced by one detector denotes the same facial
//! feature, which is what makes Procrustes fitting between two sets valid.

#[derive(Clone, Debug, PartialEq)]
pub struct LandmarkSet {
    points: Vec<(f64, f64)>,
}

impl LandmarkSet {
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Arithmetic mean of all points, or `None` for an empty set.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.points.is_empty() {
            return None;
        }
        let n = self.points.len() as f64;
        let (sx, sy) = self
            .points
            .iter()
            .fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
        Some((sx / n, sy / n))
    }

    /// Standard deviation over every centered coordinate (x and y pooled).
    pub fn pooled_std(&self) -> Option<f64> {
        let (cx, cy) = self.centroid()?;
        let sum_sq: f64 = self
            .points
            .iter()
            .map(|(x, y)| (x - cx).powi(2) + (y - cy).powi(2))
            .sum();
        Some((sum_sq / (2 * self.points.len()) as f64).sqrt())
    }
}
