//! Common geometry types and helpers used across the navigation core

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// A point in the world frame, in meters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const ORIGIN: Point2D = Point2D { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Point2D { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point2D) -> f64 {
        (other.to_vector() - self.to_vector()).norm()
    }

    /// Bearing from this point to another, in radians
    pub fn bearing_to(&self, other: &Point2D) -> f64 {
        (other.y - self.y).atan2(other.x - self.x)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn to_vector(self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

impl From<Vector2<f64>> for Point2D {
    fn from(v: Vector2<f64>) -> Self {
        Point2D::new(v.x, v.y)
    }
}

impl From<(f64, f64)> for Point2D {
    fn from((x, y): (f64, f64)) -> Self {
        Point2D::new(x, y)
    }
}

/// A planar pose (x, y, theta)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose2D {
    pub const fn new(x: f64, y: f64, theta: f64) -> Self {
        Pose2D { x, y, theta }
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.theta.is_finite()
    }
}

/// Normalize an angle into (-pi, pi]
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a <= -PI {
        a += TAU;
    }
    a
}

/// Distance from `p` to the segment `a`-`b` (clamped projection)
pub fn point_to_segment_distance(p: Point2D, a: Point2D, b: Point2D) -> f64 {
    let ab = b.to_vector() - a.to_vector();
    let ap = p.to_vector() - a.to_vector();
    let l2 = ab.norm_squared();
    if l2 == 0.0 {
        return ap.norm();
    }
    let t = (ap.dot(&ab) / l2).clamp(0.0, 1.0);
    (ap - ab * t).norm()
}

/// Total polyline length of a path
pub fn path_length(path: &[Point2D]) -> f64 {
    path.windows(2).map(|w| w[0].distance(&w[1])).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(PI, PI)]
    #[case(-PI, PI)]
    #[case(-PI / 2.0, -PI / 2.0)]
    #[case(2.5 * PI, PI / 2.0)]
    #[case(-2.5 * PI, -PI / 2.0)]
    fn normalize_angle_maps_into_half_open_range(#[case] input: f64, #[case] expected: f64) {
        assert_relative_eq!(normalize_angle(input), expected, epsilon = 1e-12);
    }

    #[rstest]
    #[case((0.5, 1.0), 1.0)]
    #[case((-1.0, 0.0), 1.0)]
    #[case((5.0, 4.0), 5.0)]
    #[case((1.0, 0.0), 0.0)]
    fn point_to_segment_uses_clamped_projection(#[case] p: (f64, f64), #[case] expected: f64) {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(2.0, 0.0);
        assert_relative_eq!(
            point_to_segment_distance(p.into(), a, b),
            expected,
            epsilon = 1e-12
        );
    }

    #[test]
    fn degenerate_segment_is_point_distance() {
        let a = Point2D::new(1.0, 1.0);
        let d = point_to_segment_distance(Point2D::new(4.0, 5.0), a, a);
        assert_relative_eq!(d, 5.0);
    }

    #[test]
    fn path_length_sums_segments() {
        let path = vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(3.0, 0.0),
            Point2D::new(3.0, 4.0),
        ];
        assert_relative_eq!(path_length(&path), 7.0);
        assert_eq!(path_length(&path[..1]), 0.0);
        assert_eq!(path_length(&[]), 0.0);
    }
}
