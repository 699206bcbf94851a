//! Runs one navigation request against the built-in robot simulator.
//!
//! Usage:
//!   adaptive_nav_node [config.toml] [--target x,y] [--start x,y]
//!                     [--mode safe|normal|efficient|social|follow]
//!                     [--obstacle x,y,r]... [--human x,y]... [--timeout secs]

use adaptive_nav::simulation::{spawn_simulation, SimulatedRobot};
use adaptive_nav::{
    ChannelSink, DetectionRecord, NavigationMode, NavigationRequest, NavigatorConfig,
    NavigationSupervisor, Point2D, Pose2D, SensorEvent,
};
use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Command line options
struct Options {
    config: NavigatorConfig,
    start: Point2D,
    target: Point2D,
    mode: NavigationMode,
    timeout: Duration,
    obstacles: Vec<(Point2D, f64)>,
    humans: Vec<Point2D>,
}

fn parse_numbers(value: &str, expected: usize) -> Result<Vec<f64>> {
    let numbers = value
        .split(',')
        .map(|s| s.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("invalid number list '{}'", value))?;
    if numbers.len() != expected {
        bail!("expected {} comma separated numbers, got '{}'", expected, value);
    }
    Ok(numbers)
}

fn parse_point(value: &str) -> Result<Point2D> {
    let n = parse_numbers(value, 2)?;
    Ok(Point2D::new(n[0], n[1]))
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut options = Options {
        config: NavigatorConfig::default(),
        start: Point2D::new(-2.0, 0.0),
        target: Point2D::new(1.5, 0.0),
        mode: NavigationMode::Normal,
        timeout: Duration::from_secs(30),
        obstacles: Vec::new(),
        humans: Vec::new(),
    };

    let mut iter = args.iter().skip(1).peekable();
    if let Some(first) = iter.peek() {
        if !first.starts_with("--") {
            let path = Path::new(first.as_str());
            info!("Loading configuration from {:?}", path);
            options.config = NavigatorConfig::load(path)?;
            iter.next();
        }
    }

    while let Some(flag) = iter.next() {
        let value = iter
            .next()
            .ok_or_else(|| anyhow!("missing value for {}", flag))?;
        match flag.as_str() {
            "--target" => options.target = parse_point(value)?,
            "--start" => options.start = parse_point(value)?,
            "--mode" => options.mode = value.parse()?,
            "--timeout" => {
                let secs: f64 = value.parse().context("invalid timeout")?;
                options.timeout = Duration::try_from_secs_f64(secs).context("invalid timeout")?;
            }
            "--obstacle" => {
                let n = parse_numbers(value, 3)?;
                options.obstacles.push((Point2D::new(n[0], n[1]), n[2]));
            }
            "--human" => options.humans.push(parse_point(value)?),
            other => bail!("unknown argument {}", other),
        }
    }
    Ok(options)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("adaptive_nav=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let options = parse_args(&args)?;
    info!("adaptive_nav v{}", env!("CARGO_PKG_VERSION"));

    let mut robot = SimulatedRobot::new(Pose2D::new(options.start.x, options.start.y, 0.0));
    for (center, radius) in &options.obstacles {
        robot = robot.with_obstacle(*center, *radius);
    }

    let (sink, commands) = ChannelSink::new();
    let tick = options.config.supervisor.tick_interval();
    let mut supervisor = NavigationSupervisor::new(options.config, Arc::new(sink))?;
    supervisor.initialize()?;

    let sensors = supervisor.sensor_sender();
    if !options.humans.is_empty() {
        let detections = options
            .humans
            .iter()
            .enumerate()
            .map(|(i, p)| DetectionRecord::new(i as u64, *p))
            .collect();
        sensors.send(SensorEvent::Humans {
            timestamp: 0.0,
            detections,
        })?;
    }
    let simulation = spawn_simulation(robot, commands, sensors, tick, 4);

    // Let the first odometry and scan land before planning
    tokio::time::sleep(tick * 4).await;

    let request = NavigationRequest::to(options.target)
        .with_mode(options.mode)
        .with_max_speed(options.mode.profile().max_linear_speed)
        .with_timeout(options.timeout);
    let result = supervisor.invoke(request).await;

    supervisor.cleanup().await?;
    drop(supervisor);
    let robot = simulation.await?;

    println!("outcome:        {:?}", result.outcome);
    println!("message:        {}", result.message);
    println!("waypoints:      {}", result.path.len());
    println!("path length:    {:.2} m", result.path_length);
    println!("obstacle cells: {}", result.obstacles_detected);
    println!("estimated time: {:.1} s", result.estimated_time);
    println!("replans:        {}", result.replans);
    println!(
        "final pose:     ({:.2}, {:.2}, {:.2})",
        robot.pose().x,
        robot.pose().y,
        robot.pose().theta
    );
    println!("collisions:     {}", robot.collisions());

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}
