pub mod common;
pub mod config;
pub mod control;
pub mod error;
pub mod lifecycle;
pub mod navigation;
pub mod perception;
pub mod simulation;

pub use crate::common::{Point2D, Pose2D};
pub use crate::config::NavigatorConfig;
pub use crate::control::{ChannelSink, VelocityCommand, VelocitySink};
pub use crate::error::{NavError, Result};
pub use crate::navigation::supervisor::{NavigationSnapshot, NavigationSupervisor, SupervisorHandle};
pub use crate::navigation::{
    NavigationMode, NavigationOutcome, NavigationRequest, NavigationResult,
};
pub use crate::perception::{DetectionRecord, LaserScan, OdometrySample, SensorEvent};
