use nalgebra::{Matrix2, Matrix3, Vector2};

use crate::alignment::domain::alignment_error::AlignmentError;
use crate::detection::domain::landmark_set::LandmarkSet;

/// Uniform scale, rotation and translation as a 3x3 homogeneous matrix.
///
/// Maps points of the subject frame into the reference frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimilarityTransform {
    matrix: Matrix3<f64>,
}

impl SimilarityTransform {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    /// Least-squares similarity fit (orthogonal Procrustes) taking `subject`
    /// onto `reference`.
    ///
    /// Both sets are centered and scaled to unit pooled standard deviation;
    /// the rotation comes from the SVD of their 2x2 cross-covariance.
    pub fn fit(reference: &LandmarkSet, subject: &LandmarkSet) -> Result<Self, AlignmentError> {
        if reference.len() != subject.len() {
            return Err(AlignmentError::DegenerateLandmarks(format!(
                "{} reference points vs {} subject points",
                reference.len(),
                subject.len()
            )));
        }
        let (Some(c_r), Some(c_s), Some(std_r), Some(std_s)) = (
            reference.centroid(),
            subject.centroid(),
            reference.pooled_std(),
            subject.pooled_std(),
        ) else {
            return Err(AlignmentError::DegenerateLandmarks("empty landmark set".into()));
        };
        if std_r <= f64::EPSILON || std_s <= f64::EPSILON {
            return Err(AlignmentError::DegenerateLandmarks("zero spread".into()));
        }

        let mut cov = Matrix2::<f64>::zeros();
        for (&(sx, sy), &(rx, ry)) in subject.points().iter().zip(reference.points()) {
            let s = Vector2::new((sx - c_s.0) / std_s, (sy - c_s.1) / std_s);
            let r = Vector2::new((rx - c_r.0) / std_r, (ry - c_r.1) / std_r);
            cov += s * r.transpose();
        }

        let svd = cov.svd(true, true);
        let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
            return Err(AlignmentError::DegenerateLandmarks("SVD did not converge".into()));
        };
        let rotation = (u * v_t).transpose();
        let scale = std_r / std_s;
        let translation =
            Vector2::new(c_r.0, c_r.1) - scale * rotation * Vector2::new(c_s.0, c_s.1);

        let sr = rotation * scale;
        #[rustfmt::skip]
        let matrix = Matrix3::new(
            sr[(0, 0)], sr[(0, 1)], translation.x,
            sr[(1, 0)], sr[(1, 1)], translation.y,
            0.0,        0.0,        1.0,
        );
        Ok(Self { matrix })
    }

    pub fn apply(&self, (x, y): (f64, f64)) -> (f64, f64) {
        let m = &self.matrix;
        (
            m[(0, 0)] * x + m[(0, 1)] * y + m[(0, 2)],
            m[(1, 0)] * x + m[(1, 1)] * y + m[(1, 2)],
        )
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Uniform scale factor.
    pub fn scale(&self) -> f64 {
        (self.matrix[(0, 0)].powi(2) + self.matrix[(1, 0)].powi(2)).sqrt()
    }

    /// Rotation angle in radians.
    pub fn rotation(&self) -> f64 {
        self.matrix[(1, 0)].atan2(self.matrix[(0, 0)])
    }

    /// Row-major `f32` coefficients, as image warping APIs expect.
    pub fn to_row_major_f32(&self) -> [f32; 9] {
        let m = &self.matrix;
        [
            m[(0, 0)] as f32,
            m[(0, 1)] as f32,
            m[(0, 2)] as f32,
            m[(1, 0)] as f32,
            m[(1, 1)] as f32,
            m[(1, 2)] as f32,
            m[(2, 0)] as f32,
            m[(2, 1)] as f32,
            m[(2, 2)] as f32,
        ]
    }
}

/// Sum of squared distances between corresponding points.
pub fn sum_squared_distance(a: &[(f64, f64)], b: &[(f64, f64)]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(p, q)| (p.0 - q.0).powi(2) + (p.1 - q.1).powi(2))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn face() -> LandmarkSet {
        LandmarkSet::new(vec![
            (120.0, 140.0),
            (180.0, 138.0),
            (150.0, 175.0),
            (128.0, 205.0),
            (172.0, 207.0),
        ])
    }

    /// Apply scale `s`, rotation `theta` and translation `(tx, ty)` to every point.
    fn similar(lm: &LandmarkSet, s: f64, theta: f64, tx: f64, ty: f64) -> LandmarkSet {
        let (sin, cos) = theta.sin_cos();
        LandmarkSet::new(
            lm.points()
                .iter()
                .map(|&(x, y)| (s * (cos * x - sin * y) + tx, s * (sin * x + cos * y) + ty))
                .collect(),
        )
    }

    fn mapped(t: &SimilarityTransform, lm: &LandmarkSet) -> Vec<(f64, f64)> {
        lm.points().iter().map(|&p| t.apply(p)).collect()
    }

    #[test]
    fn test_fit_to_self_is_identity() {
        let t = SimilarityTransform::fit(&face(), &face()).unwrap();
        let identity = Matrix3::<f64>::identity();
        for (a, b) in t.matrix().iter().zip(identity.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[rstest]
    #[case::pure_translation(1.0, 0.0, 25.0, -12.0)]
    #[case::scale_up(1.8, 0.0, 0.0, 0.0)]
    #[case::rotation(1.0, 0.3, 0.0, 0.0)]
    #[case::combined(0.6, -0.5, 40.0, 10.0)]
    fn test_recovers_exact_similarity(
        #[case] s: f64,
        #[case] theta: f64,
        #[case] tx: f64,
        #[case] ty: f64,
    ) {
        let subject = face();
        let reference = similar(&subject, s, theta, tx, ty);

        let t = SimilarityTransform::fit(&reference, &subject).unwrap();
        assert_relative_eq!(t.scale(), s, epsilon = 1e-9);
        assert_relative_eq!(t.rotation(), theta, epsilon = 1e-9);
        for (p, q) in mapped(&t, &subject).iter().zip(reference.points()) {
            assert_relative_eq!(p.0, q.0, epsilon = 1e-6);
            assert_relative_eq!(p.1, q.1, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_maps_centroid_onto_centroid() {
        let reference = face();
        let subject = similar(&reference, 0.7, 0.2, -30.0, 55.0);
        let t = SimilarityTransform::fit(&reference, &subject).unwrap();

        let (sx, sy) = subject.centroid().unwrap();
        let (rx, ry) = reference.centroid().unwrap();
        let (mx, my) = t.apply((sx, sy));
        assert_relative_eq!(mx, rx, epsilon = 1e-9);
        assert_relative_eq!(my, ry, epsilon = 1e-9);
    }

    #[test]
    fn test_fit_beats_identity_with_noise() {
        let reference = face();
        let noise = [(0.8, -0.4), (-0.5, 0.9), (0.2, 0.1), (-0.7, -0.6), (0.3, 0.5)];
        let moved = similar(&reference, 1.15, -0.12, 18.0, -7.0);
        let subject = LandmarkSet::new(
            moved
                .points()
                .iter()
                .zip(noise.iter())
                .map(|(&(x, y), &(nx, ny))| (x + nx, y + ny))
                .collect(),
        );

        let t = SimilarityTransform::fit(&reference, &subject).unwrap();
        let fitted = sum_squared_distance(&mapped(&t, &subject), reference.points());
        let identity = sum_squared_distance(subject.points(), reference.points());
        assert!(fitted < identity);
    }

    #[test]
    fn test_mismatched_cardinality_is_degenerate() {
        let short = LandmarkSet::new(vec![(0.0, 0.0), (1.0, 1.0)]);
        assert!(matches!(
            SimilarityTransform::fit(&face(), &short),
            Err(AlignmentError::DegenerateLandmarks(_))
        ));
    }

    #[test]
    fn test_empty_sets_are_degenerate() {
        let empty = LandmarkSet::new(vec![]);
        assert!(SimilarityTransform::fit(&empty, &empty).is_err());
    }

    #[test]
    fn test_collapsed_subject_is_degenerate() {
        let collapsed = LandmarkSet::new(vec![(5.0, 5.0); 5]);
        assert!(matches!(
            SimilarityTransform::fit(&face(), &collapsed),
            Err(AlignmentError::DegenerateLandmarks(_))
        ));
    }

    #[test]
    fn test_row_major_layout() {
        let reference = face();
        let subject = similar(&reference, 1.0, 0.0, -10.0, 4.0);
        let m = SimilarityTransform::fit(&reference, &subject)
            .unwrap()
            .to_row_major_f32();
        assert_relative_eq!(m[2], 10.0, epsilon = 1e-4);
        assert_relative_eq!(m[5], -4.0, epsilon = 1e-4);
        assert_eq!(&m[6..], &[0.0, 0.0, 1.0]);
    }
}
