//! Navigation module: modes, requests and results, plus the planning and
//! execution components the supervisor wires together.
pub mod costmap;
pub mod path_follower;
pub mod planner;
pub mod supervisor;

use crate::common::Point2D;
use crate::error::{NavError, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Ordered waypoints in the world frame, start to goal
pub type Path = Vec<Point2D>;

/// Navigation behaviour preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationMode {
    Safe,
    #[default]
    Normal,
    Efficient,
    Social,
    Follow,
}

/// Controller tuning selected by a [`NavigationMode`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeProfile {
    pub max_linear_speed: f64,
    pub max_angular_speed: f64,
    pub lookahead_distance: f64,
    pub slow_down_distance: f64,
}

impl NavigationMode {
    pub const ALL: [NavigationMode; 5] = [
        NavigationMode::Safe,
        NavigationMode::Normal,
        NavigationMode::Efficient,
        NavigationMode::Social,
        NavigationMode::Follow,
    ];

    pub fn profile(self) -> ModeProfile {
        let (max_linear_speed, max_angular_speed, lookahead_distance, slow_down_distance) =
            match self {
                NavigationMode::Safe => (0.2, 0.6, 0.2, 0.8),
                NavigationMode::Normal => (0.5, 1.0, 0.3, 0.5),
                NavigationMode::Efficient => (0.8, 1.5, 0.5, 0.4),
                NavigationMode::Social => (0.4, 0.8, 0.4, 0.6),
                NavigationMode::Follow => (0.6, 1.2, 0.6, 0.3),
            };
        ModeProfile {
            max_linear_speed,
            max_angular_speed,
            lookahead_distance,
            slow_down_distance,
        }
    }

    /// Whether the planner applies the social cost term in this mode
    pub fn is_social(self) -> bool {
        self == NavigationMode::Social
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NavigationMode::Safe => "safe",
            NavigationMode::Normal => "normal",
            NavigationMode::Efficient => "efficient",
            NavigationMode::Social => "social",
            NavigationMode::Follow => "follow",
        }
    }
}

impl fmt::Display for NavigationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NavigationMode {
    type Err = NavError;

    fn from_str(s: &str) -> Result<Self> {
        NavigationMode::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| NavError::InvalidRequest(format!("unknown navigation mode '{}'", s)))
    }
}

/// A request to drive to a target
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationRequest {
    pub mode: NavigationMode,
    pub target: Option<Point2D>,
    /// Clearance the caller asks for around obstacles (m)
    pub avoid_radius: f64,
    /// Linear speed cap (m/s); the mode cap still applies
    pub max_speed: f64,
    pub path_timeout: Duration,
    pub dynamic_replanning: bool,
}

impl Default for NavigationRequest {
    fn default() -> Self {
        NavigationRequest {
            mode: NavigationMode::Normal,
            target: None,
            avoid_radius: 0.5,
            max_speed: 0.5,
            path_timeout: Duration::from_secs(30),
            dynamic_replanning: true,
        }
    }
}

impl NavigationRequest {
    pub fn to(target: Point2D) -> Self {
        NavigationRequest {
            target: Some(target),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: NavigationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_speed(mut self, max_speed: f64) -> Self {
        self.max_speed = max_speed;
        self
    }

    pub fn with_avoid_radius(mut self, avoid_radius: f64) -> Self {
        self.avoid_radius = avoid_radius;
        self
    }

    pub fn with_timeout(mut self, path_timeout: Duration) -> Self {
        self.path_timeout = path_timeout;
        self
    }

    pub fn with_replanning(mut self, enabled: bool) -> Self {
        self.dynamic_replanning = enabled;
        self
    }

    /// Check numeric fields. A missing target is reported separately by the supervisor.
    pub fn validate(&self) -> Result<()> {
        if let Some(target) = self.target {
            if !target.is_finite() {
                return Err(NavError::InvalidRequest("target position is not finite".to_string()));
            }
        }
        if !(self.max_speed > 0.0) || !self.max_speed.is_finite() {
            return Err(NavError::InvalidRequest(format!(
                "max_speed must be positive, got {}",
                self.max_speed
            )));
        }
        if !(self.avoid_radius >= 0.0) || !self.avoid_radius.is_finite() {
            return Err(NavError::InvalidRequest(format!(
                "avoid_radius must be non-negative, got {}",
                self.avoid_radius
            )));
        }
        if self.path_timeout.is_zero() {
            return Err(NavError::InvalidRequest("path_timeout must be positive".to_string()));
        }
        Ok(())
    }
}

/// How a navigation request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    Succeeded,
    TimedOut,
    Failed,
}

/// Result of a navigation request
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationResult {
    pub outcome: NavigationOutcome,
    pub success: bool,
    pub message: String,
    pub path: Path,
    pub path_length: f64,
    pub obstacles_detected: usize,
    pub estimated_time: f64,
    pub replans: usize,
}

impl NavigationResult {
    pub fn failed(message: impl Into<String>) -> Self {
        NavigationResult {
            outcome: NavigationOutcome::Failed,
            success: false,
            message: message.into(),
            path: Vec::new(),
            path_length: 0.0,
            obstacles_detected: 0,
            estimated_time: 0.0,
            replans: 0,
        }
    }
}
