//! Velocity command output boundary
//!
//! The navigation core never talks to motors directly. Every command goes
//! through a [`VelocitySink`], which an external transport implements.

use crate::error::{NavError, Result};
use tokio::sync::mpsc;

/// Linear/angular velocity pair for a differential drive base
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VelocityCommand {
    pub linear: f64,
    pub angular: f64,
}

impl VelocityCommand {
    pub const STOP: VelocityCommand = VelocityCommand {
        linear: 0.0,
        angular: 0.0,
    };

    pub fn new(linear: f64, angular: f64) -> Self {
        VelocityCommand { linear, angular }
    }

    pub fn is_stop(&self) -> bool {
        self.linear == 0.0 && self.angular == 0.0
    }
}

/// Consumer of velocity commands (motor driver, transport, recorder)
#[cfg_attr(test, mockall::automock)]
pub trait VelocitySink: Send + Sync {
    fn publish(&self, command: VelocityCommand) -> Result<()>;
}

/// Sink that forwards commands into a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<VelocityCommand>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it
    pub fn new() -> (Self, mpsc::UnboundedReceiver<VelocityCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSink { tx }, rx)
    }
}

impl VelocitySink for ChannelSink {
    fn publish(&self, command: VelocityCommand) -> Result<()> {
        self.tx.send(command).map_err(|_| NavError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_forwards_commands() {
        let (sink, mut rx) = ChannelSink::new();
        sink.publish(VelocityCommand::new(0.3, -0.1)).unwrap();
        sink.publish(VelocityCommand::STOP).unwrap();
        assert_eq!(rx.try_recv().unwrap(), VelocityCommand::new(0.3, -0.1));
        assert!(rx.try_recv().unwrap().is_stop());
    }

    #[test]
    fn closed_channel_is_reported() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        let err = sink.publish(VelocityCommand::STOP).unwrap_err();
        assert!(matches!(err, NavError::ChannelClosed));
    }
}
