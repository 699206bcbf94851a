//! Kinematic robot simulator
//!
//! A unicycle base driven by velocity commands, a 360° range sensor
//! ray-cast against circular obstacles, and an async loop that feeds
//! odometry and scans to a supervisor.

use crate::common::{normalize_angle, Point2D, Pose2D};
use crate::control::VelocityCommand;
use crate::perception::{LaserScan, OdometrySample, SensorEvent};
use nalgebra::Vector2;
use std::f64::consts::TAU;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Round obstacle in the world frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleObstacle {
    pub center: Point2D,
    pub radius: f64,
}

impl CircleObstacle {
    pub fn new(center: Point2D, radius: f64) -> Self {
        CircleObstacle { center, radius }
    }

    /// Distance along a unit-length ray to the first intersection
    fn ray_distance(&self, origin: Vector2<f64>, direction: Vector2<f64>) -> Option<f64> {
        let f = origin - self.center.to_vector();
        let b = f.dot(&direction);
        let c = f.norm_squared() - self.radius * self.radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        let near = -b - root;
        let far = -b + root;
        if near >= 0.0 {
            Some(near)
        } else if far >= 0.0 {
            Some(far)
        } else {
            None
        }
    }
}

/// Simulated differential drive robot
#[derive(Debug, Clone)]
pub struct SimulatedRobot {
    pose: Pose2D,
    obstacles: Vec<CircleObstacle>,
    robot_radius: f64,
    num_rays: usize,
    max_range: f64,
    collisions: usize,
}

impl SimulatedRobot {
    pub fn new(pose: Pose2D) -> Self {
        SimulatedRobot {
            pose,
            obstacles: Vec::new(),
            robot_radius: 0.1,
            num_rays: 360,
            max_range: 5.0,
            collisions: 0,
        }
    }

    pub fn with_obstacle(mut self, center: Point2D, radius: f64) -> Self {
        self.obstacles.push(CircleObstacle::new(center, radius));
        self
    }

    pub fn with_rays(mut self, num_rays: usize) -> Self {
        self.num_rays = num_rays.max(1);
        self
    }

    pub fn pose(&self) -> Pose2D {
        self.pose
    }

    pub fn obstacles(&self) -> &[CircleObstacle] {
        &self.obstacles
    }

    /// Number of commands that would have driven the robot into an obstacle
    pub fn collisions(&self) -> usize {
        self.collisions
    }

    fn collides_at(&self, position: Point2D) -> bool {
        self.obstacles
            .iter()
            .any(|o| o.center.distance(&position) < o.radius + self.robot_radius)
    }

    /// Integrate `command` over `dt` seconds. A move into an obstacle only
    /// rotates the robot; returns true in that case.
    pub fn apply(&mut self, command: VelocityCommand, dt: f64) -> bool {
        let theta = self.pose.theta;
        let new_theta = theta + command.angular * dt;
        let (x, y) = if command.angular.abs() < 1e-9 {
            (
                self.pose.x + command.linear * theta.cos() * dt,
                self.pose.y + command.linear * theta.sin() * dt,
            )
        } else {
            let r = command.linear / command.angular;
            (
                self.pose.x + r * (new_theta.sin() - theta.sin()),
                self.pose.y + r * (theta.cos() - new_theta.cos()),
            )
        };

        self.pose.theta = normalize_angle(new_theta);
        let next = Point2D::new(x, y);
        if self.collides_at(next) {
            self.collisions += 1;
            return true;
        }
        self.pose.x = x;
        self.pose.y = y;
        false
    }

    pub fn odometry(&self) -> OdometrySample {
        OdometrySample::from_pose(self.pose)
    }

    /// Full-circle scan in the robot frame; misses read as infinity
    pub fn scan(&self) -> LaserScan {
        let increment = TAU / self.num_rays as f64;
        let origin = self.pose.position().to_vector();
        let ranges = (0..self.num_rays)
            .map(|i| {
                let angle = self.pose.theta + i as f64 * increment;
                let direction = Vector2::new(angle.cos(), angle.sin());
                self.obstacles
                    .iter()
                    .filter_map(|o| o.ray_distance(origin, direction))
                    .filter(|&d| d <= self.max_range)
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();

        LaserScan {
            angle_min: 0.0,
            angle_max: TAU - increment,
            angle_increment: increment,
            ranges,
        }
    }
}

/// Run `robot` against a supervisor: apply the latest command each `dt`,
/// publish odometry every tick and a scan every `scan_every` ticks.
///
/// Ends when either channel closes and returns the final robot state.
pub fn spawn_simulation(
    mut robot: SimulatedRobot,
    mut commands: mpsc::UnboundedReceiver<VelocityCommand>,
    sensors: mpsc::UnboundedSender<SensorEvent>,
    dt: Duration,
    scan_every: usize,
) -> JoinHandle<SimulatedRobot> {
    tokio::spawn(async move {
        let mut ticker = interval(dt);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut current = VelocityCommand::STOP;
        let mut tick = 0usize;

        loop {
            ticker.tick().await;

            loop {
                match commands.try_recv() {
                    Ok(command) => current = command,
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => return robot,
                }
            }

            robot.apply(current, dt.as_secs_f64());
            if sensors.send(SensorEvent::Odometry(robot.odometry())).is_err() {
                return robot;
            }
            if scan_every > 0
                && tick % scan_every == 0
                && sensors.send(SensorEvent::Scan(robot.scan())).is_err()
            {
                return robot;
            }
            tick += 1;
        }
    })
}
