//! Path following: the controller trait and its execution loop

use crate::common::{Point2D, Pose2D};
use crate::control::VelocityCommand;
use crate::error::Result;
use crate::navigation::NavigationMode;
use std::collections::HashMap;
use std::fmt::Debug;

pub mod executor;
pub mod pure_pursuit;

pub use executor::execute_path;
pub use pure_pursuit::PurePursuitController;

/// Execution state of a motion controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Executing,
    Paused,
}

/// Why an execution loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Within goal tolerance of the final waypoint
    GoalReached,
    /// No path to follow
    PathExhausted,
    Paused,
    Stopped,
}

/// Result of one control tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlStep {
    Command(VelocityCommand),
    Finished(ExecutionOutcome),
}

/// Trait for path following controllers
pub trait MotionController: Debug + Send {
    /// Get the name of this controller
    fn name(&self) -> &str;

    /// Configure the controller with parameters
    fn configure(&mut self, params: &HashMap<String, f64>) -> Result<()>;

    /// Swap in the tuning for `mode`
    fn set_navigation_mode(&mut self, mode: NavigationMode);

    /// Cap linear speed below the mode limit
    fn limit_linear_speed(&mut self, max_speed: f64);

    /// Replace the active path and rewind the cursor. State is unchanged.
    fn set_path(&mut self, path: Vec<Point2D>);

    fn path(&self) -> &[Point2D];

    fn state(&self) -> ControllerState;

    /// Enter `Executing` from `Idle`; a paused controller stays paused
    fn begin(&mut self);

    /// Run one control tick from `pose`, publishing the resulting command
    fn step(&mut self, pose: Pose2D) -> Result<ControlStep>;

    /// Publish a zero command and park the controller
    fn pause(&mut self);

    fn resume(&mut self);

    /// Force `Idle` and publish a zero command
    fn stop(&mut self);
}
