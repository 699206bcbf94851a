//! Lifecycle management for navigation components

use crate::error::{NavError, Result};

/// Trait for components that follow a lifecycle pattern
pub trait LifecycleNode: Send {
    /// Configure the node
    fn on_configure(&mut self) -> Result<()>;

    /// Activate the node
    fn on_activate(&mut self) -> Result<()>;

    /// Deactivate the node
    fn on_deactivate(&mut self) -> Result<()>;

    /// Clean up the node
    fn on_cleanup(&mut self) -> Result<()>;

    /// Current lifecycle state
    fn lifecycle_state(&self) -> State;
}

/// State of a lifecycle node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unconfigured,
    Inactive,
    Active,
}

/// Base implementation for lifecycle nodes
#[derive(Debug)]
pub struct LifecycleNodeBase {
    pub name: String,
    state: State,
}

impl LifecycleNodeBase {
    /// Create a new lifecycle node base
    pub fn new(name: &str) -> Self {
        LifecycleNodeBase {
            name: name.to_string(),
            state: State::Unconfigured,
        }
    }

    /// Get the current state
    pub fn get_state(&self) -> State {
        self.state
    }

    /// Move from `from` to `to`, rejecting any other starting state
    pub fn transition(&mut self, from: State, to: State) -> Result<()> {
        if self.state != from {
            return Err(NavError::Lifecycle(format!(
                "{}: cannot move to {:?} from {:?} (expected {:?})",
                self.name, to, self.state, from
            )));
        }
        tracing::debug!("{}: {:?} -> {:?}", self.name, from, to);
        self.state = to;
        Ok(())
    }
}
