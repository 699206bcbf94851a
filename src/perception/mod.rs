//! Perception input boundary: range scans, odometry and human detections
pub mod humans;

use crate::common::{Point2D, Pose2D};
use crate::error::{NavError, Result};
use nalgebra::{Quaternion, UnitQuaternion, Vector2};

/// Planar range scan in the robot frame
#[derive(Debug, Clone, PartialEq)]
pub struct LaserScan {
    pub angle_min: f64,
    pub angle_max: f64,
    pub angle_increment: f64,
    pub ranges: Vec<f64>,
}

impl LaserScan {
    fn validate(&self) -> Result<()> {
        if !self.angle_min.is_finite() || !self.angle_max.is_finite() {
            return Err(NavError::SensorFault(format!(
                "scan angles are not finite: [{}, {}]",
                self.angle_min, self.angle_max
            )));
        }
        if !self.angle_increment.is_finite() || self.angle_increment == 0.0 {
            return Err(NavError::SensorFault(format!(
                "invalid scan angle increment {}",
                self.angle_increment
            )));
        }
        Ok(())
    }

    /// Project usable readings into the world frame from `pose`.
    ///
    /// A reading is usable iff it is finite and strictly inside
    /// `(min_range, max_range)`.
    pub fn to_world_points(&self, pose: Pose2D, min_range: f64, max_range: f64) -> Result<Vec<Point2D>> {
        self.validate()?;
        if !pose.is_finite() {
            return Err(NavError::SensorFault("cannot project scan from a non-finite pose".to_string()));
        }

        let points = self
            .ranges
            .iter()
            .enumerate()
            .filter(|(_, &r)| r.is_finite() && r > min_range && r < max_range)
            .map(|(i, &r)| {
                let angle = self.angle_min + i as f64 * self.angle_increment + pose.theta;
                Point2D::new(pose.x + r * angle.cos(), pose.y + r * angle.sin())
            })
            .collect();
        Ok(points)
    }
}

/// Pose sample from odometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdometrySample {
    pub position: Point2D,
    pub orientation: Quaternion<f64>,
}

impl OdometrySample {
    pub fn from_pose(pose: Pose2D) -> Self {
        OdometrySample {
            position: pose.position(),
            orientation: UnitQuaternion::from_euler_angles(0.0, 0.0, pose.theta).into_inner(),
        }
    }

    /// Heading about the vertical axis
    pub fn yaw(&self) -> Result<f64> {
        let q = self.orientation;
        if !(q.w.is_finite() && q.i.is_finite() && q.j.is_finite() && q.k.is_finite()) {
            return Err(NavError::SensorFault("orientation is not finite".to_string()));
        }
        if q.norm() < 1e-9 {
            return Err(NavError::SensorFault("orientation quaternion has zero norm".to_string()));
        }
        let (_, _, yaw) = UnitQuaternion::from_quaternion(q).euler_angles();
        Ok(yaw)
    }

    pub fn pose(&self) -> Result<Pose2D> {
        if !self.position.is_finite() {
            return Err(NavError::SensorFault("odometry position is not finite".to_string()));
        }
        Ok(Pose2D::new(self.position.x, self.position.y, self.yaw()?))
    }
}

/// One human detection as delivered by an external detector
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    pub id: u64,
    pub position: Point2D,
    pub velocity: Option<Vector2<f64>>,
    pub confidence: Option<f64>,
}

impl DetectionRecord {
    pub fn new(id: u64, position: Point2D) -> Self {
        DetectionRecord {
            id,
            position,
            velocity: None,
            confidence: None,
        }
    }

    pub fn with_velocity(mut self, vx: f64, vy: f64) -> Self {
        self.velocity = Some(Vector2::new(vx, vy));
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Sensor input consumed by the navigation supervisor
#[derive(Debug, Clone)]
pub enum SensorEvent {
    Scan(LaserScan),
    Odometry(OdometrySample),
    Humans {
        /// Detection time in seconds
        timestamp: f64,
        detections: Vec<DetectionRecord>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn scan(ranges: Vec<f64>) -> LaserScan {
        LaserScan {
            angle_min: 0.0,
            angle_max: 3.0 * FRAC_PI_2,
            angle_increment: FRAC_PI_2,
            ranges,
        }
    }

    #[test]
    fn projects_readings_with_pose() {
        let points = scan(vec![1.0, 2.0])
            .to_world_points(Pose2D::new(1.0, 1.0, FRAC_PI_2), 0.1, 5.0)
            .unwrap();
        assert_eq!(points.len(), 2);
        assert_relative_eq!(points[0].x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(points[0].y, 2.0, epsilon = 1e-9);
        assert_relative_eq!(points[1].x, -1.0, epsilon = 1e-9);
        assert_relative_eq!(points[1].y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn filters_unusable_readings() {
        let points = scan(vec![0.1, f64::NAN, 5.0, f64::INFINITY, 0.5])
            .to_world_points(Pose2D::default(), 0.1, 5.0)
            .unwrap();
        // Only index 4 survives, at angle 2*pi
        assert_eq!(points.len(), 1);
        assert_relative_eq!(points[0].x, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn malformed_header_is_a_sensor_fault() {
        let mut bad = scan(vec![1.0]);
        bad.angle_increment = 0.0;
        assert!(matches!(
            bad.to_world_points(Pose2D::default(), 0.1, 5.0),
            Err(NavError::SensorFault(_))
        ));

        let mut bad = scan(vec![1.0]);
        bad.angle_min = f64::NAN;
        assert!(bad.to_world_points(Pose2D::default(), 0.1, 5.0).is_err());
    }

    #[test]
    fn odometry_yaw_round_trips() {
        for yaw in [0.0, 0.5, -1.2, PI - 0.01] {
            let sample = OdometrySample::from_pose(Pose2D::new(0.3, -0.2, yaw));
            let pose = sample.pose().unwrap();
            assert_relative_eq!(pose.theta, yaw, epsilon = 1e-9);
            assert_relative_eq!(pose.x, 0.3);
        }
    }

    #[test]
    fn unnormalised_quaternion_still_yields_yaw() {
        let unit = UnitQuaternion::from_euler_angles(0.0, 0.0, 0.7).into_inner();
        let sample = OdometrySample {
            position: Point2D::ORIGIN,
            orientation: Quaternion::new(unit.w * 3.0, unit.i * 3.0, unit.j * 3.0, unit.k * 3.0),
        };
        assert_relative_eq!(sample.yaw().unwrap(), 0.7, epsilon = 1e-9);
    }

    #[test]
    fn degenerate_orientation_is_rejected() {
        let sample = OdometrySample {
            position: Point2D::ORIGIN,
            orientation: Quaternion::new(0.0, 0.0, 0.0, 0.0),
        };
        assert!(matches!(sample.yaw(), Err(NavError::SensorFault(_))));

        let sample = OdometrySample {
            position: Point2D::ORIGIN,
            orientation: Quaternion::new(f64::NAN, 0.0, 0.0, 1.0),
        };
        assert!(sample.pose().is_err());
    }
}
