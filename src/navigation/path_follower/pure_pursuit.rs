//! Pure Pursuit path follower implementation

use super::{ControlStep, ControllerState, ExecutionOutcome, MotionController};
use crate::common::{normalize_angle, Point2D, Pose2D};
use crate::control::{VelocityCommand, VelocitySink};
use crate::error::{NavError, Result};
use crate::navigation::{ModeProfile, NavigationMode};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

/// Waypoints within this many entries of the end trigger the slow-down
const TAIL_WINDOW: usize = 3;

/// Pure Pursuit controller for a differential drive base
pub struct PurePursuitController {
    sink: Arc<dyn VelocitySink>,
    profile: ModeProfile,
    mode: NavigationMode,
    // Proportional gains
    k_linear: f64,
    k_angular: f64,
    goal_tolerance: f64,
    // Request speed cap, applied on top of the mode cap
    speed_cap: f64,
    path: Vec<Point2D>,
    cursor: usize,
    state: ControllerState,
}

impl fmt::Debug for PurePursuitController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PurePursuitController")
            .field("mode", &self.mode)
            .field("profile", &self.profile)
            .field("k_linear", &self.k_linear)
            .field("k_angular", &self.k_angular)
            .field("goal_tolerance", &self.goal_tolerance)
            .field("speed_cap", &self.speed_cap)
            .field("waypoints", &self.path.len())
            .field("cursor", &self.cursor)
            .field("state", &self.state)
            .finish()
    }
}

impl PurePursuitController {
    pub fn new(sink: Arc<dyn VelocitySink>) -> Self {
        PurePursuitController {
            sink,
            profile: NavigationMode::Normal.profile(),
            mode: NavigationMode::Normal,
            k_linear: 0.5,
            k_angular: 1.0,
            goal_tolerance: 0.1,
            speed_cap: f64::INFINITY,
            path: Vec::new(),
            cursor: 0,
            state: ControllerState::Idle,
        }
    }

    pub fn mode(&self) -> NavigationMode {
        self.mode
    }

    pub fn profile(&self) -> ModeProfile {
        self.profile
    }

    pub fn goal_tolerance(&self) -> f64 {
        self.goal_tolerance
    }

    /// Index of the next candidate waypoint
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn max_linear_speed(&self) -> f64 {
        self.profile.max_linear_speed.min(self.speed_cap)
    }

    pub fn max_angular_speed(&self) -> f64 {
        self.profile.max_angular_speed
    }

    /// Advance the cursor to the first waypoint at least the lookahead
    /// distance away and return it. Once the path is exhausted the final
    /// waypoint is returned; `None` means there is no path.
    pub fn get_target_point(&mut self, position: Point2D) -> Option<Point2D> {
        let last = *self.path.last()?;
        while let Some(waypoint) = self.path.get(self.cursor) {
            if waypoint.distance(&position) >= self.profile.lookahead_distance {
                return Some(*waypoint);
            }
            self.cursor += 1;
        }
        Some(last)
    }

    /// Velocity toward `target` from `pose`
    pub fn compute_velocity(&self, pose: Pose2D, target: Point2D) -> VelocityCommand {
        let position = pose.position();
        let distance = position.distance(&target);
        let angle_error = normalize_angle(position.bearing_to(&target) - pose.theta);

        let max_angular = self.max_angular_speed();
        let angular = (self.k_angular * angle_error).clamp(-max_angular, max_angular);

        // Collapses toward zero as the heading error approaches pi
        let mut linear = self.k_linear * distance * (1.0 - angle_error.abs() / PI);

        if self.cursor + TAIL_WINDOW >= self.path.len() && self.profile.slow_down_distance > 0.0 {
            linear *= (distance / self.profile.slow_down_distance).min(1.0);
        }

        let linear = linear.clamp(0.0, self.max_linear_speed());
        VelocityCommand::new(linear, angular)
    }

    fn publish(&self, command: VelocityCommand) -> Result<()> {
        self.sink.publish(command)
    }

    fn emergency_stop(&mut self, reason: &str) -> NavError {
        tracing::error!("Emergency stop: {}", reason);
        if let Err(e) = self.publish(VelocityCommand::STOP) {
            tracing::error!("Failed to publish emergency stop: {}", e);
        }
        self.state = ControllerState::Idle;
        NavError::ExecutionFault(reason.to_string())
    }

    fn finish(&mut self, outcome: ExecutionOutcome) -> Result<ControlStep> {
        self.state = ControllerState::Idle;
        if let Err(e) = self.publish(VelocityCommand::STOP) {
            return Err(self.emergency_stop(&format!("stop command failed: {}", e)));
        }
        Ok(ControlStep::Finished(outcome))
    }
}

impl MotionController for PurePursuitController {
    fn name(&self) -> &str {
        "PurePursuitController"
    }

    fn configure(&mut self, params: &HashMap<String, f64>) -> Result<()> {
        if let Some(&k_linear) = params.get("k_linear") {
            if !(k_linear > 0.0) || !k_linear.is_finite() {
                return Err(NavError::Config("Linear gain must be positive".to_string()));
            }
            self.k_linear = k_linear;
        }

        if let Some(&k_angular) = params.get("k_angular") {
            if !(k_angular > 0.0) || !k_angular.is_finite() {
                return Err(NavError::Config("Angular gain must be positive".to_string()));
            }
            self.k_angular = k_angular;
        }

        if let Some(&tolerance) = params.get("goal_tolerance") {
            if !(tolerance > 0.0) || !tolerance.is_finite() {
                return Err(NavError::Config("Goal tolerance must be positive".to_string()));
            }
            self.goal_tolerance = tolerance;
        }

        Ok(())
    }

    fn set_navigation_mode(&mut self, mode: NavigationMode) {
        self.mode = mode;
        self.profile = mode.profile();
        tracing::debug!("Controller switched to {} mode: {:?}", mode, self.profile);
    }

    fn limit_linear_speed(&mut self, max_speed: f64) {
        if max_speed > 0.0 {
            self.speed_cap = max_speed;
        } else {
            tracing::warn!("Ignoring non-positive speed cap {}", max_speed);
        }
    }

    fn set_path(&mut self, path: Vec<Point2D>) {
        tracing::debug!("Setting path with {} points", path.len());
        self.path = path;
        self.cursor = 0;
    }

    fn path(&self) -> &[Point2D] {
        &self.path
    }

    fn state(&self) -> ControllerState {
        self.state
    }

    fn begin(&mut self) {
        if self.state == ControllerState::Idle {
            self.state = ControllerState::Executing;
        }
    }

    fn step(&mut self, pose: Pose2D) -> Result<ControlStep> {
        match self.state {
            ControllerState::Idle => return Ok(ControlStep::Finished(ExecutionOutcome::Stopped)),
            ControllerState::Paused => return Ok(ControlStep::Finished(ExecutionOutcome::Paused)),
            ControllerState::Executing => {}
        }

        if !pose.is_finite() {
            return Err(self.emergency_stop("robot pose is not finite"));
        }

        let position = pose.position();
        let target = match self.get_target_point(position) {
            Some(target) => target,
            None => {
                tracing::info!("No target point remains, path execution completed");
                return self.finish(ExecutionOutcome::PathExhausted);
            }
        };

        if self.cursor + 1 >= self.path.len() && position.distance(&target) <= self.goal_tolerance {
            tracing::info!("Reached final waypoint ({:.2}, {:.2})", target.x, target.y);
            return self.finish(ExecutionOutcome::GoalReached);
        }

        let command = self.compute_velocity(pose, target);
        if let Err(e) = self.publish(command) {
            return Err(self.emergency_stop(&format!("velocity publish failed: {}", e)));
        }
        tracing::debug!(
            "cmd v={:.3} w={:.3} target=({:.2}, {:.2}) cursor={}/{}",
            command.linear,
            command.angular,
            target.x,
            target.y,
            self.cursor,
            self.path.len()
        );
        Ok(ControlStep::Command(command))
    }

    fn pause(&mut self) {
        if self.state == ControllerState::Executing {
            self.state = ControllerState::Paused;
        }
        if let Err(e) = self.publish(VelocityCommand::STOP) {
            tracing::error!("Failed to publish stop on pause: {}", e);
        }
    }

    fn resume(&mut self) {
        if self.state == ControllerState::Paused {
            self.state = ControllerState::Executing;
        }
    }

    fn stop(&mut self) {
        self.state = ControllerState::Idle;
        if let Err(e) = self.publish(VelocityCommand::STOP) {
            tracing::error!("Failed to publish stop: {}", e);
        }
    }
}
