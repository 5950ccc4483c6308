use ndarray::{Array2, ArrayView2};

use crate::detection::domain::landmark_set::LandmarkSet;
use crate::shared::constants::ERODE_THRESHOLD;

use super::convex_hull::{convex_hull, cross};
use super::gaussian::{blur_plane, gaussian_kernel_1d};

/// Binary face region (values 0.0 or 1.0), indexed `[y, x]`.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceMask {
    data: Array2<f32>,
}

impl FaceMask {
    /// Rasterize the convex hull of `landmarks` over an all-zero `width` x `height` plane.
    ///
    /// Integer coordinates are pixel centers; pixels on the hull boundary are inside.
    pub fn from_landmarks(width: u32, height: u32, landmarks: &LandmarkSet) -> Self {
        let (w, h) = (width as usize, height as usize);
        let mut data = Array2::<f32>::zeros((h, w));
        let hull = convex_hull(landmarks.points());
        if hull.is_empty() || w == 0 || h == 0 {
            return Self { data };
        }

        let (min_x, max_x, min_y, max_y) = hull.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
            |(x0, x1, y0, y1), &(x, y)| (x0.min(x), x1.max(x), y0.min(y), y1.max(y)),
        );
        let x_range = pixel_span(min_x, max_x, w);
        let y_range = pixel_span(min_y, max_y, h);
        let (Some((x_lo, x_hi)), Some((y_lo, y_hi))) = (x_range, y_range) else {
            return Self { data };
        };

        for y in y_lo..=y_hi {
            for x in x_lo..=x_hi {
                if contains(&hull, (x as f64, y as f64)) {
                    data[[y, x]] = 1.0;
                }
            }
        }
        Self { data }
    }

    /// Shrink the mask by blurring with an odd Gaussian kernel and keeping
    /// only values that stay above the erosion threshold.
    ///
    /// Even sizes are rounded up to the next odd size. Sizes of 1 or less
    /// return the mask unchanged.
    pub fn eroded(&self, kernel_size: usize) -> Self {
        if kernel_size <= 1 {
            return self.clone();
        }
        let size = kernel_size | 1;
        let (h, w) = self.data.dim();
        let mut plane: Vec<f32> = self.data.iter().copied().collect();
        blur_plane(&mut plane, w, h, &gaussian_kernel_1d(size));

        let data = Array2::from_shape_fn((h, w), |(y, x)| {
            if plane[y * w + x] > ERODE_THRESHOLD {
                1.0
            } else {
                0.0
            }
        });
        Self { data }
    }

    pub fn width(&self) -> u32 {
        self.data.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.data.nrows() as u32
    }

    pub fn is_set(&self, x: usize, y: usize) -> bool {
        self.data[[y, x]] > 0.0
    }

    /// Sum of mask values (the on-pixel count for a binary mask).
    pub fn sum(&self) -> f64 {
        self.data.iter().map(|&v| v as f64).sum()
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    /// Row-major flat indices of every on pixel.
    pub fn on_pixels(&self) -> Vec<usize> {
        let w = self.data.ncols();
        self.data
            .indexed_iter()
            .filter(|(_, &v)| v > 0.0)
            .map(|((y, x), _)| y * w + x)
            .collect()
    }
}

/// Integer pixel range covering `[lo, hi]`, clipped to `0..len`.
fn pixel_span(lo: f64, hi: f64, len: usize) -> Option<(usize, usize)> {
    let first = lo.ceil().max(0.0);
    let last = hi.floor().min(len as f64 - 1.0);
    if first > last {
        return None;
    }
    Some((first as usize, last as usize))
}

const EDGE_EPS: f64 = 1e-9;

/// Point-in-convex-polygon test for a counter-clockwise hull, boundary inclusive.
///
/// Hulls with fewer than three vertices are treated as a point or a segment.
fn contains(hull: &[(f64, f64)], p: (f64, f64)) -> bool {
    match hull.len() {
        1 => (hull[0].0 - p.0).abs() < 0.5 && (hull[0].1 - p.1).abs() < 0.5,
        2 => on_segment(hull[0], hull[1], p),
        n => (0..n).all(|i| cross(hull[i], hull[(i + 1) % n], p) >= -EDGE_EPS),
    }
}

fn on_segment(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> bool {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0);
    let (qx, qy) = (a.0 + t * dx, a.1 + t * dy);
    (p.0 - qx).powi(2) + (p.1 - qy).powi(2) <= 0.25
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(lo: f64, hi: f64) -> LandmarkSet {
        LandmarkSet::new(vec![(lo, lo), (hi, lo), (hi, hi), (lo, hi), ((lo + hi) / 2.0, lo + 1.0)])
    }

    #[test]
    fn test_square_hull_fills_inclusive() {
        let mask = FaceMask::from_landmarks(10, 10, &square(2.0, 5.0));
        // 4x4 pixels from 2..=5 in both axes.
        assert_eq!(mask.sum(), 16.0);
        assert!(mask.is_set(2, 2));
        assert!(mask.is_set(5, 5));
        assert!(!mask.is_set(6, 5));
        assert!(!mask.is_set(1, 2));
    }

    #[test]
    fn test_values_are_binary() {
        let lm = LandmarkSet::new(vec![(1.3, 1.7), (8.2, 2.1), (4.9, 8.8)]);
        let mask = FaceMask::from_landmarks(10, 10, &lm);
        assert!(mask.view().iter().all(|&v| v == 0.0 || v == 1.0));
        assert!(mask.sum() > 0.0);
    }

    #[test]
    fn test_rebuild_is_bit_identical() {
        let lm = LandmarkSet::new(vec![(3.1, 2.2), (12.7, 4.0), (9.5, 14.2), (2.0, 11.1)]);
        let a = FaceMask::from_landmarks(16, 16, &lm);
        let b = FaceMask::from_landmarks(16, 16, &lm);
        assert_eq!(a, b);
    }

    #[test]
    fn test_hull_outside_frame_is_clipped() {
        let mask = FaceMask::from_landmarks(4, 4, &square(-10.0, 20.0));
        assert_eq!(mask.sum(), 16.0);
    }

    #[test]
    fn test_hull_entirely_outside_is_empty() {
        let mask = FaceMask::from_landmarks(4, 4, &square(10.0, 20.0));
        assert_eq!(mask.sum(), 0.0);
    }

    #[test]
    fn test_empty_landmarks_give_empty_mask() {
        let mask = FaceMask::from_landmarks(4, 3, &LandmarkSet::new(vec![]));
        assert_eq!(mask.width(), 4);
        assert_eq!(mask.height(), 3);
        assert_eq!(mask.sum(), 0.0);
    }

    #[test]
    fn test_erosion_shrinks_mask() {
        let mask = FaceMask::from_landmarks(40, 40, &square(5.0, 34.0));
        let eroded = mask.eroded(11);
        assert!(eroded.sum() < mask.sum());
        assert!(eroded.sum() > 0.0);
        assert!(eroded.is_set(20, 20));
        assert!(!eroded.is_set(5, 5));
        assert!(eroded.view().iter().all(|&v| v == 0.0 || v == 1.0));
    }

    #[test]
    fn test_eroded_mask_is_subset() {
        let mask = FaceMask::from_landmarks(40, 40, &square(5.0, 34.0));
        let eroded = mask.eroded(7);
        for (e, m) in eroded.view().iter().zip(mask.view().iter()) {
            assert!(*e <= *m);
        }
    }

    #[test]
    fn test_erode_size_one_is_noop() {
        let mask = FaceMask::from_landmarks(10, 10, &square(2.0, 5.0));
        assert_eq!(mask.eroded(1), mask);
        assert_eq!(mask.eroded(0), mask);
    }

    #[test]
    fn test_on_pixels_are_row_major() {
        let mask = FaceMask::from_landmarks(4, 4, &LandmarkSet::new(vec![(1.0, 2.0)]));
        assert_eq!(mask.on_pixels(), vec![2 * 4 + 1]);
    }
}
