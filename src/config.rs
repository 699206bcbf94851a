//! Configuration loading for the navigation core

use crate::error::{NavError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NavigatorConfig {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub humans: HumanConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// Controller gain overrides, forwarded to `MotionController::configure`
    #[serde(default)]
    pub controller: HashMap<String, f64>,
}

/// Local occupancy grid dimensions
#[derive(Clone, Debug, Deserialize)]
pub struct GridConfig {
    /// Width in cells (default: 100)
    #[serde(default = "default_grid_cells")]
    pub width: usize,

    /// Height in cells (default: 100)
    #[serde(default = "default_grid_cells")]
    pub height: usize,

    /// Meters per cell (default: 0.05)
    #[serde(default = "default_resolution")]
    pub resolution: f64,
}

/// Range-scan ingestion settings
#[derive(Clone, Debug, Deserialize)]
pub struct ScanConfig {
    /// Readings at or below this range are ignored (default: 0.1 m)
    #[serde(default = "default_min_range")]
    pub min_range: f64,

    /// Readings at or above this range are ignored (default: 5.0 m)
    #[serde(default = "default_max_range")]
    pub max_range: f64,

    /// Disc radius stamped around every scan return (default: 0.15 m)
    #[serde(default = "default_obstacle_radius")]
    pub obstacle_radius: f64,
}

/// A* cost model settings
#[derive(Clone, Debug, Deserialize)]
pub struct PlannerConfig {
    /// Numerator of the obstacle proximity penalty in social mode (default: 2.0)
    #[serde(default = "default_social_cost_weight")]
    pub social_cost_weight: f64,

    /// Obstacles closer than this many cells add a penalty (default: 5.0)
    #[serde(default = "default_social_radius_cells")]
    pub social_radius_cells: f64,

    /// Weight of the per-cell human comfort cost in social mode (default: 1.0)
    #[serde(default = "default_human_cost_weight")]
    pub human_cost_weight: f64,
}

/// Human tracking settings
#[derive(Clone, Debug, Deserialize)]
pub struct HumanConfig {
    /// Detections older than this are pruned (default: 5.0 s)
    #[serde(default = "default_tracking_timeout")]
    pub tracking_timeout_secs: f64,

    /// Humans within this distance of a path are reported (default: 1.0 m)
    #[serde(default = "default_path_threshold")]
    pub path_threshold: f64,

    /// Confidence assumed when a detection carries none (default: 0.8)
    #[serde(default = "default_confidence")]
    pub default_confidence: f64,
}

/// Supervisor timing
#[derive(Clone, Debug, Deserialize)]
pub struct SupervisorConfig {
    /// Interval between completion checks in `invoke` (default: 100 ms)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Interval between velocity commands while executing (default: 50 ms)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Odometry closer than this to the target marks success (default: 0.2 m)
    #[serde(default = "default_goal_reached_distance")]
    pub goal_reached_distance: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: default_grid_cells(),
            height: default_grid_cells(),
            resolution: default_resolution(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_range: default_min_range(),
            max_range: default_max_range(),
            obstacle_radius: default_obstacle_radius(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            social_cost_weight: default_social_cost_weight(),
            social_radius_cells: default_social_radius_cells(),
            human_cost_weight: default_human_cost_weight(),
        }
    }
}

impl Default for HumanConfig {
    fn default() -> Self {
        Self {
            tracking_timeout_secs: default_tracking_timeout(),
            path_threshold: default_path_threshold(),
            default_confidence: default_confidence(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            tick_interval_ms: default_tick_interval(),
            goal_reached_distance: default_goal_reached_distance(),
        }
    }
}

impl SupervisorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

// Default value functions
fn default_grid_cells() -> usize {
    100
}
fn default_resolution() -> f64 {
    0.05
}
fn default_min_range() -> f64 {
    0.1
}
fn default_max_range() -> f64 {
    5.0
}
fn default_obstacle_radius() -> f64 {
    0.15
}
fn default_social_cost_weight() -> f64 {
    2.0
}
fn default_social_radius_cells() -> f64 {
    5.0
}
fn default_human_cost_weight() -> f64 {
    1.0
}
fn default_tracking_timeout() -> f64 {
    5.0
}
fn default_path_threshold() -> f64 {
    1.0
}
fn default_confidence() -> f64 {
    0.8
}
fn default_poll_interval() -> u64 {
    100
}
fn default_tick_interval() -> u64 {
    50
}
fn default_goal_reached_distance() -> f64 {
    0.2
}

impl NavigatorConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NavError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: NavigatorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the navigation core cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.grid.width == 0 || self.grid.height == 0 {
            return Err(NavError::Config("Grid dimensions must be positive".to_string()));
        }
        if !(self.grid.resolution > 0.0) || !self.grid.resolution.is_finite() {
            return Err(NavError::Config("Grid resolution must be positive".to_string()));
        }
        if !(self.scan.min_range >= 0.0) || !(self.scan.max_range > self.scan.min_range) {
            return Err(NavError::Config(format!(
                "Scan range window is empty: ({}, {})",
                self.scan.min_range, self.scan.max_range
            )));
        }
        if !(self.scan.obstacle_radius >= 0.0) {
            return Err(NavError::Config("Obstacle radius must be non-negative".to_string()));
        }
        if !(self.humans.tracking_timeout_secs > 0.0) {
            return Err(NavError::Config("Tracking timeout must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.humans.default_confidence) {
            return Err(NavError::Config("Default confidence must lie in [0, 1]".to_string()));
        }
        if self.supervisor.poll_interval_ms == 0 || self.supervisor.tick_interval_ms == 0 {
            return Err(NavError::Config("Supervisor intervals must be positive".to_string()));
        }
        if !(self.supervisor.goal_reached_distance > 0.0) {
            return Err(NavError::Config("Goal reached distance must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = NavigatorConfig::from_toml_str("").unwrap();
        assert_eq!(config.grid.width, 100);
        assert_eq!(config.grid.resolution, 0.05);
        assert_eq!(config.scan.obstacle_radius, 0.15);
        assert_eq!(config.planner.social_radius_cells, 5.0);
        assert_eq!(config.humans.tracking_timeout_secs, 5.0);
        assert_eq!(config.supervisor.poll_interval(), Duration::from_millis(100));
        assert!(config.controller.is_empty());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = NavigatorConfig::from_toml_str(
            r#"
            [grid]
            width = 20
            resolution = 0.1

            [controller]
            k_linear = 0.8
            "#,
        )
        .unwrap();
        assert_eq!(config.grid.width, 20);
        assert_eq!(config.grid.height, 100);
        assert_eq!(config.grid.resolution, 0.1);
        assert_eq!(config.controller.get("k_linear"), Some(&0.8));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = NavigatorConfig::from_toml_str("[grid]\nresolution = 0.0").unwrap_err();
        assert!(matches!(err, NavError::Config(_)));

        let err = NavigatorConfig::from_toml_str("[scan]\nmin_range = 2.0\nmax_range = 1.0")
            .unwrap_err();
        assert!(matches!(err, NavError::Config(_)));
    }

    #[test]
    fn shipped_config_parses() {
        let config =
            NavigatorConfig::from_toml_str(include_str!("../config/adaptive_nav.toml")).unwrap();
        assert_eq!(config.supervisor.tick_interval(), Duration::from_millis(50));
        assert_eq!(config.controller.get("goal_tolerance"), Some(&0.1));
    }

    #[test]
    fn malformed_toml_maps_to_config_error() {
        let err = NavigatorConfig::from_toml_str("[grid\nwidth = ").unwrap_err();
        assert!(matches!(err, NavError::Config(_)));
    }
}
