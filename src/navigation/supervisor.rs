//! Navigation supervisor
//!
//! Owns the occupancy grid, human tracker and robot pose, and orchestrates
//! the planner and motion controller for one navigation request at a time.
//!
//! Sensor events arrive through an unbounded channel and are applied by a
//! single worker task. Shared state lives behind one world mutex; the
//! controller has its own mutex. When both are needed the world lock is
//! always taken first.

use super::costmap::OccupancyGrid;
use super::path_follower::executor::lock_controller;
use super::path_follower::{
    execute_path, ControllerState, ExecutionOutcome, MotionController, PurePursuitController,
};
use super::planner::{AStarPlanner, PathPlanner};
use super::{NavigationMode, NavigationOutcome, NavigationRequest, NavigationResult, Path};
use crate::common::{path_length, Point2D, Pose2D};
use crate::config::{NavigatorConfig, ScanConfig};
use crate::control::VelocitySink;
use crate::error::{NavError, Result};
use crate::lifecycle::{LifecycleNode, LifecycleNodeBase, State};
use crate::perception::humans::HumanTracker;
use crate::perception::{DetectionRecord, LaserScan, OdometrySample, SensorEvent};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

type ExecutionHandle = JoinHandle<Result<ExecutionOutcome>>;

/// State of the request currently being served
#[derive(Debug, Clone)]
struct Session {
    goal: Point2D,
    mode: NavigationMode,
    dynamic_replanning: bool,
    path: Path,
    executing: bool,
    target_reached: bool,
    /// Set by scan ingestion when the active path runs through an obstacle
    needs_replan: bool,
    replans: usize,
}

/// Everything sensor ingestion mutates
#[derive(Debug)]
struct WorldState {
    grid: OccupancyGrid,
    humans: HumanTracker,
    pose: watch::Sender<Pose2D>,
    session: Option<Session>,
}

fn lock_world(world: &Mutex<WorldState>) -> Result<MutexGuard<'_, WorldState>> {
    world
        .lock()
        .map_err(|_| NavError::ExecutionFault("world state lock poisoned".to_string()))
}

/// Write human comfort costs into free cells, or clear them outside social mode
fn refresh_cost_layer(grid: &mut OccupancyGrid, humans: &HumanTracker, social: bool) {
    if social && !humans.is_empty() {
        grid.apply_cost_field(|p| humans.social_cost(p));
    } else {
        grid.clear_costs();
    }
}

/// Read-only view of the navigation state for visualization
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationSnapshot {
    pub pose: Pose2D,
    pub path: Path,
    /// Centers of occupied cells
    pub obstacles: Vec<Point2D>,
    pub humans: Vec<Point2D>,
    pub mode: Option<NavigationMode>,
    pub target: Option<Point2D>,
    pub controller_state: ControllerState,
}

/// Cloneable handle for pausing, resuming and observing navigation while a
/// request is in flight.
#[derive(Clone)]
pub struct SupervisorHandle {
    world: Arc<Mutex<WorldState>>,
    controller: Arc<Mutex<dyn MotionController>>,
}

impl SupervisorHandle {
    /// Halt the robot; the active request keeps its timeout running
    pub fn pause(&self) -> Result<()> {
        lock_controller(&self.controller)?.pause();
        tracing::info!("Navigation paused");
        Ok(())
    }

    /// Continue from the current path cursor
    pub fn resume(&self) -> Result<()> {
        lock_controller(&self.controller)?.resume();
        tracing::info!("Navigation resumed");
        Ok(())
    }

    pub fn snapshot(&self) -> Result<NavigationSnapshot> {
        let mut snapshot = {
            let world = lock_world(&self.world)?;
            let pose = *world.pose.borrow();
            NavigationSnapshot {
                pose,
                path: world.session.as_ref().map(|s| s.path.clone()).unwrap_or_default(),
                obstacles: world
                    .grid
                    .obstacles()
                    .map(|(x, y)| world.grid.grid_to_world(x, y))
                    .collect(),
                humans: world.humans.humans().map(|h| h.position).collect(),
                mode: world.session.as_ref().map(|s| s.mode),
                target: world.session.as_ref().map(|s| s.goal),
                controller_state: ControllerState::Idle,
            }
        };
        snapshot.controller_state = lock_controller(&self.controller)?.state();
        Ok(snapshot)
    }
}

/// Applies sensor events on the worker task
struct SensorContext {
    world: Arc<Mutex<WorldState>>,
    scan: ScanConfig,
    goal_reached_distance: f64,
}

impl SensorContext {
    fn apply(&self, event: SensorEvent) -> Result<()> {
        match event {
            SensorEvent::Scan(scan) => self.apply_scan(&scan),
            SensorEvent::Odometry(sample) => self.apply_odometry(&sample),
            SensorEvent::Humans {
                timestamp,
                detections,
            } => self.apply_humans(timestamp, &detections),
        }
    }

    fn apply_scan(&self, scan: &LaserScan) -> Result<()> {
        let mut guard = lock_world(&self.world)?;
        let world = &mut *guard;
        let pose = *world.pose.borrow();

        let points = scan.to_world_points(pose, self.scan.min_range, self.scan.max_range)?;
        world.grid.rebuild_obstacles(&points, self.scan.obstacle_radius)?;
        tracing::debug!(
            "Scan: {} returns, {} occupied cells",
            points.len(),
            world.grid.obstacle_count()
        );

        // Replanning happens on the supervising task; only flag it here
        if let Some(session) = world.session.as_mut() {
            if session.executing
                && session.dynamic_replanning
                && !session.needs_replan
                && world.grid.is_path_blocked(&session.path)
            {
                tracing::warn!("Active path is blocked at ({:.2}, {:.2})", pose.x, pose.y);
                session.needs_replan = true;
            }
        }
        Ok(())
    }

    fn apply_odometry(&self, sample: &OdometrySample) -> Result<()> {
        let pose = sample.pose()?;
        let mut world = lock_world(&self.world)?;
        world.pose.send_replace(pose);

        if let Some(session) = world.session.as_mut() {
            if !session.target_reached
                && pose.position().distance(&session.goal) < self.goal_reached_distance
            {
                tracing::info!("Target reached at ({:.2}, {:.2})", pose.x, pose.y);
                session.target_reached = true;
            }
        }
        Ok(())
    }

    fn apply_humans(&self, timestamp: f64, detections: &[DetectionRecord]) -> Result<()> {
        if !timestamp.is_finite() {
            return Err(NavError::SensorFault("detection timestamp is not finite".to_string()));
        }
        let mut world = lock_world(&self.world)?;
        world.humans.update(detections, timestamp);
        Ok(())
    }
}

type SensorReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<SensorEvent>>>;

/// Apply events until every sender is gone. The receiver is only borrowed,
/// so aborting the worker leaves it in place for the next activation.
async fn run_sensor_worker(context: SensorContext, receiver: SensorReceiver) {
    tracing::debug!("Sensor worker started");
    let mut events = receiver.lock().await;
    while let Some(event) = events.recv().await {
        if let Err(e) = context.apply(event) {
            tracing::warn!("Dropping sensor sample: {}", e);
        }
    }
    tracing::debug!("Sensor worker stopped");
}

/// Top-level navigation orchestrator
pub struct NavigationSupervisor {
    config: NavigatorConfig,
    base: LifecycleNodeBase,
    planner: Arc<dyn PathPlanner>,
    controller: Arc<Mutex<dyn MotionController>>,
    world: Arc<Mutex<WorldState>>,
    pose: watch::Receiver<Pose2D>,
    sensor_tx: mpsc::UnboundedSender<SensorEvent>,
    sensor_rx: SensorReceiver,
    sensor_worker: Option<JoinHandle<()>>,
    execution: Option<ExecutionHandle>,
}

impl NavigationSupervisor {
    /// Build a supervisor with the A* planner and a pure pursuit controller
    /// publishing to `sink`.
    pub fn new(config: NavigatorConfig, sink: Arc<dyn VelocitySink>) -> Result<Self> {
        let planner = Arc::new(AStarPlanner::new(config.planner.clone()));
        let controller = Arc::new(Mutex::new(PurePursuitController::new(sink)));
        Self::with_components(config, planner, controller)
    }

    pub fn with_components(
        config: NavigatorConfig,
        planner: Arc<dyn PathPlanner>,
        controller: Arc<Mutex<dyn MotionController>>,
    ) -> Result<Self> {
        config.validate()?;
        let grid = OccupancyGrid::from_config(&config.grid)?;
        let humans = HumanTracker::new(&config.humans);
        let (pose_tx, pose_rx) = watch::channel(Pose2D::default());
        let (sensor_tx, sensor_rx) = mpsc::unbounded_channel();

        Ok(NavigationSupervisor {
            config,
            base: LifecycleNodeBase::new("navigation_supervisor"),
            planner,
            controller,
            world: Arc::new(Mutex::new(WorldState {
                grid,
                humans,
                pose: pose_tx,
                session: None,
            })),
            pose: pose_rx,
            sensor_tx,
            sensor_rx: Arc::new(tokio::sync::Mutex::new(sensor_rx)),
            sensor_worker: None,
            execution: None,
        })
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    /// Sender for sensor events. It stays valid across deactivate and
    /// activate cycles; events sent while inactive queue until reactivation.
    pub fn sensor_sender(&self) -> mpsc::UnboundedSender<SensorEvent> {
        self.sensor_tx.clone()
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            world: Arc::clone(&self.world),
            controller: Arc::clone(&self.controller),
        }
    }

    /// Latest pose from odometry
    pub fn pose(&self) -> Pose2D {
        *self.pose.borrow()
    }

    pub fn pause(&self) -> Result<()> {
        self.handle().pause()
    }

    pub fn resume(&self) -> Result<()> {
        self.handle().resume()
    }

    pub fn snapshot(&self) -> Result<NavigationSnapshot> {
        self.handle().snapshot()
    }

    /// Configure and activate. Calling it on an active supervisor is a no-op.
    pub fn initialize(&mut self) -> Result<()> {
        if self.base.get_state() == State::Unconfigured {
            self.on_configure()?;
        }
        if self.base.get_state() == State::Inactive {
            self.on_activate()?;
        }
        Ok(())
    }

    /// Stop the robot and tear down to `Unconfigured`
    pub async fn cleanup(&mut self) -> Result<()> {
        self.halt_execution().await;
        if self.base.get_state() == State::Active {
            self.on_deactivate()?;
        }
        if self.base.get_state() == State::Inactive {
            self.on_cleanup()?;
        }
        tracing::info!("{} cleaned up", self.base.name);
        Ok(())
    }

    /// Plan to the request target and drive there, resolving to success,
    /// timeout or failure.
    pub async fn invoke(&mut self, request: NavigationRequest) -> NavigationResult {
        // The timeout covers planning as well as execution
        let started = Instant::now();
        let target = match request.target {
            Some(target) => target,
            None => {
                tracing::warn!("Navigation request without a target");
                return NavigationResult::failed("No target position provided");
            }
        };
        if let Err(e) = request.validate() {
            return NavigationResult::failed(e.to_string());
        }
        if let Err(e) = self.initialize() {
            return NavigationResult::failed(e.to_string());
        }

        // Any previous execution is superseded
        self.halt_execution().await;

        match self.run(&request, target, started).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Navigation failed: {}", e);
                NavigationResult::failed(e.to_string())
            }
        }
    }

    async fn run(
        &mut self,
        request: &NavigationRequest,
        target: Point2D,
        started: Instant,
    ) -> Result<NavigationResult> {
        tracing::info!(
            "Navigating to ({:.2}, {:.2}) in {} mode",
            target.x,
            target.y,
            request.mode
        );

        {
            let mut controller = lock_controller(&self.controller)?;
            controller.set_navigation_mode(request.mode);
            controller.limit_linear_speed(request.max_speed);
        }

        let (path, obstacles_detected) = match self.plan_session(request, target) {
            Ok(planned) => planned,
            Err(NavError::Unreachable(reason)) => {
                tracing::warn!("{}", reason);
                let mut result = NavigationResult::failed("Failed to plan a path to the target");
                result.obstacles_detected = lock_world(&self.world)?.grid.obstacle_count();
                return Ok(result);
            }
            Err(e) => return Err(e),
        };

        let length = path_length(&path);
        let mut result = NavigationResult {
            outcome: NavigationOutcome::Failed,
            success: false,
            message: String::new(),
            path: path.clone(),
            path_length: length,
            obstacles_detected,
            estimated_time: length / request.max_speed,
            replans: 0,
        };
        tracing::info!(
            "Planned {} waypoints, {:.2}m, {} obstacle cells",
            path.len(),
            length,
            obstacles_detected
        );

        lock_controller(&self.controller)?.set_path(path);
        self.spawn_execution()?;

        let (outcome, message) = self.supervise(request, target, started).await;
        self.halt_execution().await;

        result.replans = self.end_session()?.map_or(0, |s| s.replans);
        result.success = outcome == NavigationOutcome::Succeeded;
        result.outcome = outcome;
        result.message = message;
        tracing::info!("Navigation finished: {:?} ({})", result.outcome, result.message);
        Ok(result)
    }

    /// Plan from the current pose and open a session for the request
    fn plan_session(&self, request: &NavigationRequest, target: Point2D) -> Result<(Path, usize)> {
        let mut guard = lock_world(&self.world)?;
        let world = &mut *guard;
        let start = world.pose.borrow().position();
        let social = request.mode.is_social();

        refresh_cost_layer(&mut world.grid, &world.humans, social);
        let raw = self.planner.plan_path(&mut world.grid, start, target, social);
        let path = self.planner.smooth_path(&raw);
        let obstacles = world.grid.obstacle_count();
        if path.is_empty() {
            return Err(NavError::Unreachable(format!(
                "no path from ({:.2}, {:.2}) to ({:.2}, {:.2})",
                start.x, start.y, target.x, target.y
            )));
        }

        if let Some(human) = world.humans.humans_in_path(&path, self.config.humans.path_threshold).first() {
            tracing::info!("Human {} is near the planned path", human.id);
        }

        world.session = Some(Session {
            goal: target,
            mode: request.mode,
            dynamic_replanning: request.dynamic_replanning,
            path: path.clone(),
            executing: false,
            target_reached: false,
            needs_replan: false,
            replans: 0,
        });
        Ok((path, obstacles))
    }

    fn end_session(&self) -> Result<Option<Session>> {
        Ok(lock_world(&self.world)?.session.take())
    }

    fn set_executing(&self, executing: bool) -> Result<()> {
        if let Some(session) = lock_world(&self.world)?.session.as_mut() {
            session.executing = executing;
        }
        Ok(())
    }

    fn spawn_execution(&mut self) -> Result<()> {
        self.set_executing(true)?;
        self.execution = Some(tokio::spawn(execute_path(
            Arc::clone(&self.controller),
            self.pose.clone(),
            self.config.supervisor.tick_interval(),
        )));
        Ok(())
    }

    fn target_reached(&self) -> Result<bool> {
        Ok(lock_world(&self.world)?
            .session
            .as_ref()
            .map_or(false, |s| s.target_reached))
    }

    /// Replan from the current pose when scan ingestion flagged the active
    /// path. The search runs on the blocking pool against a copy of the grid.
    async fn replan_if_needed(&self) -> Result<bool> {
        let (mut grid, start, goal, social) = {
            let mut guard = lock_world(&self.world)?;
            let world = &mut *guard;
            let Some(session) = world.session.as_mut() else {
                return Ok(false);
            };
            if !session.needs_replan {
                return Ok(false);
            }
            session.needs_replan = false;
            let goal = session.goal;
            let social = session.mode.is_social();
            refresh_cost_layer(&mut world.grid, &world.humans, social);
            let start = world.pose.borrow().position();
            (world.grid.clone(), start, goal, social)
        };

        let planner = Arc::clone(&self.planner);
        let path = tokio::task::spawn_blocking(move || {
            let raw = planner.plan_path(&mut grid, start, goal, social);
            planner.smooth_path(&raw)
        })
        .await
        .map_err(|e| NavError::ExecutionFault(format!("replanning task failed: {}", e)))?;
        if path.is_empty() {
            tracing::warn!("Replanning found no path to the target");
        } else {
            tracing::info!("Replanned: {} waypoints, {:.2}m", path.len(), path_length(&path));
        }

        {
            let mut world = lock_world(&self.world)?;
            match world.session.as_mut() {
                Some(session) => {
                    session.path = path.clone();
                    session.replans += 1;
                }
                None => return Ok(false),
            }
        }
        lock_controller(&self.controller)?.set_path(path);
        Ok(true)
    }

    /// Poll until the target is reached, the timeout expires or execution ends
    async fn supervise(
        &mut self,
        request: &NavigationRequest,
        target: Point2D,
        started: Instant,
    ) -> (NavigationOutcome, String) {
        let mut ticker = interval(self.config.supervisor.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match self.target_reached() {
                Ok(true) => {
                    return (
                        NavigationOutcome::Succeeded,
                        format!(
                            "Successfully reached target. Path length: {:.2}m",
                            self.active_path_length()
                        ),
                    );
                }
                Ok(false) => {}
                Err(e) => return (NavigationOutcome::Failed, e.to_string()),
            }

            if started.elapsed() >= request.path_timeout {
                tracing::warn!("Navigation timed out");
                return (
                    NavigationOutcome::TimedOut,
                    format!(
                        "Navigation timed out after {} seconds",
                        request.path_timeout.as_secs_f64()
                    ),
                );
            }

            if let Err(e) = self.replan_if_needed().await {
                return (NavigationOutcome::Failed, e.to_string());
            }

            let finished = self.execution.as_ref().map_or(true, |h| h.is_finished());
            if !finished {
                continue;
            }

            let ended = match self.execution.take() {
                Some(handle) => handle.await,
                None => Ok(Ok(ExecutionOutcome::Paused)),
            };
            let state = match lock_controller(&self.controller) {
                Ok(controller) => controller.state(),
                Err(e) => return (NavigationOutcome::Failed, e.to_string()),
            };

            match ended {
                Ok(Ok(ExecutionOutcome::Paused)) if state == ControllerState::Paused => {
                    // Parked until resumed
                    if let Err(e) = self.set_executing(false) {
                        tracing::error!("{}", e);
                    }
                }
                Ok(Ok(ExecutionOutcome::Paused)) if state == ControllerState::Executing => {
                    if let Err(e) = self.spawn_execution() {
                        return (NavigationOutcome::Failed, e.to_string());
                    }
                }
                Ok(Ok(outcome)) => {
                    let distance = self.pose().position().distance(&target);
                    if distance < self.config.supervisor.goal_reached_distance {
                        return (
                            NavigationOutcome::Succeeded,
                            format!(
                                "Successfully reached target. Path length: {:.2}m",
                                self.active_path_length()
                            ),
                        );
                    }
                    return (
                        NavigationOutcome::Failed,
                        format!(
                            "Path execution ended ({:?}) {:.2}m from the target",
                            outcome, distance
                        ),
                    );
                }
                Ok(Err(e)) => return (NavigationOutcome::Failed, e.to_string()),
                Err(e) => {
                    return (
                        NavigationOutcome::Failed,
                        format!("Path execution task failed: {}", e),
                    )
                }
            }
        }
    }

    fn active_path_length(&self) -> f64 {
        lock_world(&self.world)
            .ok()
            .and_then(|w| w.session.as_ref().map(|s| path_length(&s.path)))
            .unwrap_or(0.0)
    }

    /// Stop the controller (zero command) and join the execution task
    async fn halt_execution(&mut self) {
        match lock_controller(&self.controller) {
            Ok(mut controller) => controller.stop(),
            Err(e) => tracing::error!("Cannot stop controller: {}", e),
        }
        if let Some(handle) = self.execution.take() {
            match handle.await {
                Ok(Ok(outcome)) => tracing::debug!("Execution joined: {:?}", outcome),
                Ok(Err(e)) => tracing::warn!("Execution ended with error: {}", e),
                Err(e) => tracing::warn!("Execution task failed: {}", e),
            }
        }
        if let Err(e) = self.set_executing(false) {
            tracing::error!("{}", e);
        }
    }

    fn sensor_context(&self) -> SensorContext {
        SensorContext {
            world: Arc::clone(&self.world),
            scan: self.config.scan.clone(),
            goal_reached_distance: self.config.supervisor.goal_reached_distance,
        }
    }
}

impl LifecycleNode for NavigationSupervisor {
    fn on_configure(&mut self) -> Result<()> {
        self.config.validate()?;
        lock_controller(&self.controller)?.configure(&self.config.controller)?;
        self.base.transition(State::Unconfigured, State::Inactive)?;
        tracing::info!("Configured {}", self.base.name);
        Ok(())
    }

    fn on_activate(&mut self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| NavError::Lifecycle(format!("no async runtime: {}", e)))?;
        self.base.transition(State::Inactive, State::Active)?;

        self.sensor_worker = Some(runtime.spawn(run_sensor_worker(
            self.sensor_context(),
            Arc::clone(&self.sensor_rx),
        )));
        tracing::info!("Activated {}", self.base.name);
        Ok(())
    }

    fn on_deactivate(&mut self) -> Result<()> {
        self.base.transition(State::Active, State::Inactive)?;
        lock_controller(&self.controller)?.stop();
        if let Some(execution) = self.execution.take() {
            execution.abort();
        }
        if let Some(worker) = self.sensor_worker.take() {
            worker.abort();
        }
        tracing::info!("Deactivated {}", self.base.name);
        Ok(())
    }

    fn on_cleanup(&mut self) -> Result<()> {
        self.base.transition(State::Inactive, State::Unconfigured)?;
        let mut world = lock_world(&self.world)?;
        world.grid.clear_obstacles();
        world.grid.clear_costs();
        world.humans.clear();
        world.session = None;
        tracing::info!("Cleaned up {}", self.base.name);
        Ok(())
    }

    fn lifecycle_state(&self) -> State {
        self.base.get_state()
    }
}

impl Drop for NavigationSupervisor {
    fn drop(&mut self) {
        if let Ok(mut controller) = lock_controller(&self.controller) {
            controller.stop();
        }
        if let Some(worker) = self.sensor_worker.take() {
            worker.abort();
        }
    }
}
