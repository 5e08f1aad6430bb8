/// Axis-aligned box; any bound may be infinite.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub lower_left: [f64; 3],
    pub upper_right: [f64; 3],
    pub center: [f64; 3],
    pub width: [f64; 3],
}

impl BoundingBox {
    pub fn new(lower_left: [f64; 3], upper_right: [f64; 3]) -> Self {
        let center = [
            0.5 * (lower_left[0] + upper_right[0]),
            0.5 * (lower_left[1] + upper_right[1]),
            0.5 * (lower_left[2] + upper_right[2]),
        ];
        let width = [
            upper_right[0] - lower_left[0],
            upper_right[1] - lower_left[1],
            upper_right[2] - lower_left[2],
        ];
        BoundingBox {
            lower_left,
            upper_right,
            center,
            width,
        }
    }

    /// Box covering a set of points.
    pub fn around(points: &[[f64; 3]]) -> Self {
        let mut lower = [f64::INFINITY; 3];
        let mut upper = [f64::NEG_INFINITY; 3];
        for p in points {
            for i in 0..3 {
                lower[i] = lower[i].min(p[i]);
                upper[i] = upper[i].max(p[i]);
            }
        }
        BoundingBox::new(lower, upper)
    }

    /// True when both bounds of `axis` are finite.
    pub fn is_bounded(&self, axis: usize) -> bool {
        self.lower_left[axis].is_finite() && self.upper_right[axis].is_finite()
    }

    pub fn contains(&self, point: [f64; 3]) -> bool {
        (0..3).all(|i| point[i] >= self.lower_left[i] && point[i] <= self.upper_right[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_and_width() {
        let bb = BoundingBox::new([-1.0, 0.0, 2.0], [1.0, 4.0, 3.0]);
        assert_eq!(bb.center, [0.0, 2.0, 2.5]);
        assert_eq!(bb.width, [2.0, 4.0, 1.0]);
        assert!(bb.contains([0.5, 1.0, 2.5]));
        assert!(!bb.contains([0.5, 5.0, 2.5]));
    }

    #[test]
    fn test_unbounded_axis() {
        let bb = BoundingBox::new([-1.0, -1.0, f64::NEG_INFINITY], [1.0, 1.0, f64::INFINITY]);
        assert!(bb.is_bounded(0));
        assert!(!bb.is_bounded(2));
    }

    #[test]
    fn test_around_points() {
        let bb = BoundingBox::around(&[[0.0, 1.0, 2.0], [-3.0, 5.0, 1.0]]);
        assert_eq!(bb.lower_left, [-3.0, 1.0, 1.0]);
        assert_eq!(bb.upper_right, [0.0, 5.0, 2.0]);
    }
}
