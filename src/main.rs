//! # CanSat descent mission demo
//!
//! Runs a three-state mission on simulated hardware:
//! - **Standby:** waits a fixed number of ticks after release.
//! - **Descent:** watches barometric altitude until it drops below the landing threshold.
//! - **Landed:** drives both wheels from the control thread, then ends the mission.
//!
//! Usage: `cansat_demo [config.toml]`. Without a config file the mission ticks
//! every 10 ms and logs to `data/logs/`. Ctrl-C stops the mission cleanly.
//!
//! ## Outputs
//! - `data/logs/FlightData_<timestamp>.csv`: one row per tick.
//! - `data/logs/mission_summary.csv`: one row per activation, appended per run.

use cansat_runtime::{
    CanSat, Component, ComponentManager, Context, MissionReport, Next, NodeFlow, NodeHandle,
    NodeKey, RuntimeConfig, RuntimeSettings, Sensor,
    error::{ModelError, NodeError},
    logging::init_logging,
    mission::Node,
    model::{Binding, Derived, Link, LinkedDataModel, Value},
    sim::{SimBarometer, SimGps, SimImu, SimMotor, TwoWheelDrive},
    utils::export::export_report_csv,
};
use log::{debug, error, info, warn};
use std::{
    env,
    error::Error,
    path::Path,
    process,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

const STANDBY_TICKS: u32 = 20;
const LANDED_TICKS: u32 = 50;
const LANDING_ALTITUDE_M: f64 = 5.0;
const DRIVE_DUTY: f64 = 0.6;

// ========================================================================
// Aggregate read by every node
// ========================================================================

#[derive(Debug, Default)]
struct FlightData {
    binding: Binding,
}

static FLIGHT_LINKS: [Link; 5] = [
    Link::new("altitude", "bme", "altitude"),
    Link::new("pressure", "bme", "pressure"),
    Link::new("temperature", "bme", "temperature"),
    Link::new("fix", "gps", "fix"),
    Link::new("accel", "imu", "accel"),
];

fn accel_norm(data: &FlightData) -> Result<Value, ModelError> {
    let accel = data.value_vector("accel")?;
    Ok(accel.iter().map(|a| a * a).sum::<f64>().sqrt().into())
}

static FLIGHT_DERIVED: [Derived<FlightData>; 1] = [Derived::new("accel_norm", accel_norm)];

impl LinkedDataModel for FlightData {
    fn links() -> &'static [Link] {
        &FLIGHT_LINKS
    }

    fn derived() -> &'static [Derived<Self>] {
        &FLIGHT_DERIVED
    }

    fn binding(&self) -> &Binding {
        &self.binding
    }

    fn binding_mut(&mut self) -> &mut Binding {
        &mut self.binding
    }
}

// ========================================================================
// Mission states
// ========================================================================

struct Standby {
    ticks: AtomicU32,
}

impl Node<bool> for Standby {
    type Model = FlightData;

    fn create(_: NodeHandle<bool>) -> Result<Self, NodeError> {
        Ok(Self {
            ticks: AtomicU32::new(0),
        })
    }

    fn judge(&self, _: &FlightData) -> Result<bool, NodeError> {
        Ok(self.ticks.fetch_add(1, Ordering::Relaxed) + 1 >= STANDBY_TICKS)
    }
}

struct Descent {
    handle: NodeHandle<bool>,
}

impl Node<bool> for Descent {
    type Model = FlightData;

    fn create(handle: NodeHandle<bool>) -> Result<Self, NodeError> {
        Ok(Self { handle })
    }

    fn enter(&mut self) -> Result<(), NodeError> {
        self.handle.log("parachute deployed");
        Ok(())
    }

    fn judge(&self, data: &FlightData) -> Result<bool, NodeError> {
        Ok(data.value_f64("altitude")? < LANDING_ALTITUDE_M)
    }

    fn control(&self) -> Result<(), NodeError> {
        while !self.handle.wait_ending(Duration::from_millis(250)) {
            if let Some(latest) = self.handle.recent().latest_as::<FlightData>() {
                match latest.value_f64("altitude") {
                    Ok(altitude) => debug!("descending: {:.1} m", altitude),
                    Err(e) => warn!("altitude unavailable: {}", e),
                }
            }
        }
        Ok(())
    }
}

struct Landed {
    handle: NodeHandle<bool>,
    drive: Arc<TwoWheelDrive>,
    ticks: AtomicU32,
}

impl Node<bool> for Landed {
    type Model = FlightData;

    fn create(handle: NodeHandle<bool>) -> Result<Self, NodeError> {
        let drive = handle.component::<TwoWheelDrive>("drive")?;
        Ok(Self {
            handle,
            drive,
            ticks: AtomicU32::new(0),
        })
    }

    fn judge(&self, _: &FlightData) -> Result<bool, NodeError> {
        Ok(self.ticks.fetch_add(1, Ordering::Relaxed) + 1 >= LANDED_TICKS)
    }

    fn control(&self) -> Result<(), NodeError> {
        self.drive.forward(DRIVE_DUTY);
        self.handle.wait_ending(Duration::from_secs(60));
        self.drive.stop();
        Ok(())
    }

    fn exit(&mut self) -> Result<(), NodeError> {
        let (left, right) = self.drive.duties();
        self.handle
            .log(format!("wheels stopped (duty {:.1}/{:.1})", left, right));
        Ok(())
    }
}

// ========================================================================
// Entry point
// ========================================================================

fn load_config() -> Result<RuntimeConfig, Box<dyn Error>> {
    match env::args().nth(1) {
        Some(path) => Ok(RuntimeConfig::from_file(Path::new(&path))?),
        None => Ok(RuntimeConfig {
            runtime: RuntimeSettings {
                tick_interval_ms: Some(10),
                ..RuntimeSettings::default()
            },
            ..RuntimeConfig::default()
        }),
    }
}

fn run_mission(config: &RuntimeConfig) -> Result<MissionReport, Box<dyn Error>> {
    let barometer = Arc::new(SimBarometer::new("bme", 120.0, 0.8).with_dropout(0.01));
    let gps = Arc::new(SimGps::new("gps", 40.14, 139.99));
    let imu = Arc::new(SimImu::new("imu"));
    let drive = Arc::new(TwoWheelDrive::new(
        "drive",
        Arc::new(SimMotor::new("motor_left")),
        Arc::new(SimMotor::new("motor_right")),
    ));

    let mut manager = ComponentManager::new();
    manager.append(
        [
            Arc::clone(&barometer) as Arc<dyn Component>,
            Arc::clone(&gps) as Arc<dyn Component>,
            Arc::clone(&imu) as Arc<dyn Component>,
            drive as Arc<dyn Component>,
        ],
        true,
    );

    let mut context = Context::new();
    context.set_flow(
        [
            NodeFlow::of::<Standby>([
                (false, Next::node::<Standby>()),
                (true, Next::node::<Descent>()),
            ]),
            NodeFlow::of::<Descent>([
                (false, Next::node::<Descent>()),
                (true, Next::node::<Landed>()),
            ]),
            NodeFlow::of::<Landed>([(false, Next::node::<Landed>()), (true, Next::Terminal)]),
        ],
        NodeKey::of::<Standby>(),
    )?;

    let mut cansat = CanSat::from_config(context, manager, config);
    let sensors: [Arc<dyn Sensor>; 3] = [barometer, gps, imu];
    for sensor in sensors {
        cansat.data_logger_mut().add_sensor(sensor);
    }

    let shutdown = cansat.shutdown_handle();
    ctrlc::set_handler(move || {
        warn!("interrupt received; stopping mission");
        shutdown.request();
    })?;

    let report = cansat.run()?;
    export_report_csv(&report, &config.logger.dir.join("mission_summary.csv"))?;
    Ok(report)
}

fn main() {
    if let Err(e) = init_logging() {
        eprintln!("logging unavailable: {}", e);
    }
    info!("=== CANSAT MISSION START ===");

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            process::exit(2);
        }
    };

    match run_mission(&config) {
        Ok(report) => {
            info!(
                "=== CANSAT MISSION FINISHED === path {:?}, {} ticks, {} sensor failures, {} rows",
                report.path(),
                report.total_ticks(),
                report.total_sensor_failures(),
                report.rows_written
            );
        }
        Err(e) => {
            error!("mission failed: {}", e);
            process::exit(1);
        }
    }
}
