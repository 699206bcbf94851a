//! Tick-driven execution of the active path

use super::{ControlStep, ExecutionOutcome, MotionController};
use crate::common::Pose2D;
use crate::error::{NavError, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Lock a shared controller, mapping poisoning to an execution fault
pub fn lock_controller<C>(controller: &Mutex<C>) -> Result<MutexGuard<'_, C>>
where
    C: MotionController + ?Sized,
{
    controller
        .lock()
        .map_err(|_| NavError::ExecutionFault("controller lock poisoned".to_string()))
}

/// Drive `controller` along its path, one command per `tick`, reading the
/// latest pose from `pose` before every step.
///
/// Returns once the controller finishes, is paused or stopped externally,
/// or faults. The controller lock is never held across an await point.
pub async fn execute_path<C>(
    controller: Arc<Mutex<C>>,
    pose: watch::Receiver<Pose2D>,
    tick: Duration,
) -> Result<ExecutionOutcome>
where
    C: MotionController + ?Sized,
{
    {
        let mut guard = lock_controller(&controller)?;
        guard.begin();
        tracing::info!(
            "{} executing path with {} waypoints",
            guard.name(),
            guard.path().len()
        );
    }

    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut commands = 0usize;
    loop {
        ticker.tick().await;
        let current = *pose.borrow();

        let step = {
            let mut guard = lock_controller(&controller)?;
            guard.step(current)?
        };

        match step {
            ControlStep::Command(_) => commands += 1,
            ControlStep::Finished(outcome) => {
                tracing::info!("Path execution ended: {:?} after {} commands", outcome, commands);
                return Ok(outcome);
            }
        }
    }
}
