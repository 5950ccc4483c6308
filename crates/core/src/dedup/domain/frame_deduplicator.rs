use crate::shared::frame::Frame;

/// Drops near-duplicate consecutive frames.
///
/// Each frame is compared against the last *retained* frame, so a slow drift
/// of small changes still accumulates into a kept frame eventually.
pub struct FrameDeduplicator {
    threshold: f64,
    last_kept: Option<Frame>,
}

impl FrameDeduplicator {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            last_kept: None,
        }
    }

    /// Returns `true` if the frame should be kept, remembering it as the new
    /// comparison target.
    pub fn admit(&mut self, frame: &Frame) -> bool {
        if let Some(last) = &self.last_kept {
            if let Some(distance) = l2_distance(last, frame) {
                if distance <= self.threshold {
                    log::debug!(
                        "Dropping {} as duplicate (distance {distance:.1})",
                        frame.name()
                    );
                    return false;
                }
            }
        }
        self.last_kept = Some(frame.clone());
        true
    }
}

/// Pixel L2 distance over every channel sample, or `None` if shapes differ.
pub fn l2_distance(a: &Frame, b: &Frame) -> Option<f64> {
    if !a.same_shape(b) {
        return None;
    }
    let sum_sq: f64 = a
        .data()
        .iter()
        .zip(b.data())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum();
    Some(sum_sq.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn uniform(value: u8, w: u32, h: u32) -> Frame {
        Frame::new(vec![value; (w * h * 3) as usize], w, h, 3, 0)
    }

    #[test]
    fn test_first_frame_is_always_kept() {
        let mut dedup = FrameDeduplicator::new(f64::MAX);
        assert!(dedup.admit(&uniform(0, 4, 4)));
    }

    #[test]
    fn test_identical_frame_is_dropped() {
        let mut dedup = FrameDeduplicator::new(1.0);
        assert!(dedup.admit(&uniform(10, 4, 4)));
        assert!(!dedup.admit(&uniform(10, 4, 4)));
    }

    #[test]
    fn test_distant_frame_is_kept() {
        let mut dedup = FrameDeduplicator::new(2000.0);
        assert!(dedup.admit(&uniform(0, 20, 20)));
        // 1200 samples differing by 100 -> distance ~3464
        assert!(dedup.admit(&uniform(100, 20, 20)));
    }

    #[test]
    fn test_distance_equal_to_threshold_is_duplicate() {
        // 48 samples differing by 5 -> sqrt(48 * 25) = 34.64...
        let threshold = (48.0f64 * 25.0).sqrt();
        let mut dedup = FrameDeduplicator::new(threshold);
        assert!(dedup.admit(&uniform(0, 4, 4)));
        assert!(!dedup.admit(&uniform(5, 4, 4)));
    }

    #[test]
    fn test_compares_against_last_retained_frame() {
        let mut dedup = FrameDeduplicator::new(100.0);
        assert!(dedup.admit(&uniform(0, 4, 4)));
        // Each step is 48 * 9 -> ~20.8 from its predecessor, but drift
        // accumulates against the retained frame.
        assert!(!dedup.admit(&uniform(3, 4, 4)));
        assert!(!dedup.admit(&uniform(6, 4, 4)));
        assert!(!dedup.admit(&uniform(12, 4, 4)));
        assert!(dedup.admit(&uniform(15, 4, 4)));
        assert!(!dedup.admit(&uniform(18, 4, 4)));
    }

    #[test]
    fn test_shape_change_is_never_duplicate() {
        let mut dedup = FrameDeduplicator::new(f64::MAX);
        assert!(dedup.admit(&uniform(0, 4, 4)));
        assert!(dedup.admit(&uniform(0, 8, 4)));
    }

    #[test]
    fn test_l2_distance_uses_signed_differences() {
        let a = Frame::new(vec![10, 200, 0], 1, 1, 3, 0);
        let b = Frame::new(vec![20, 100, 0], 1, 1, 3, 1);
        assert_relative_eq!(
            l2_distance(&a, &b).unwrap(),
            (100.0f64 + 10000.0).sqrt()
        );
        assert_relative_eq!(l2_distance(&b, &a).unwrap(), l2_distance(&a, &b).unwrap());
    }
}
