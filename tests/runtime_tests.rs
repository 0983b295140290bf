mod common;

use cansat_runtime::{
    CanSat, Component, ComponentManager, Context, ContextError, DataLogger, Flag, LogError,
    LinkedDataModel, LogQueue, LoggerConfig, ModelError, Next, Node, NodeError, NodeHandle, RuntimeError,
    RuntimeSettings,
    logging::{Lifecycle, SystemEvent},
};
use common::{BmeClimate, Climate, FailingSink, MemorySink, ScriptedSensor, memory_logger};
use parking_lot::Mutex;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

fn mission<F: Flag>(
    context: Context<F>,
    manager: ComponentManager,
    sensor: ScriptedSensor,
) -> (CanSat<F>, MemorySink, Arc<ScriptedSensor>) {
    let (mut logger, sink) = memory_logger(100);
    let sensor = Arc::new(sensor);
    logger.add_sensor(sensor.clone());
    (CanSat::new(context, manager, logger), sink, sensor)
}

/// Lifecycle events rendered as "{event} {node}", oldest first.
fn lifecycle(events: &[SystemEvent]) -> Vec<String> {
    events
        .iter()
        .filter(|e| e.lifecycle().is_some())
        .map(ToString::to_string)
        .collect()
}

fn position(events: &[String], wanted: &str) -> usize {
    events
        .iter()
        .position(|e| e == wanted)
        .unwrap_or_else(|| panic!("'{wanted}' missing from {events:?}"))
}

/// Judge returns `true` on tick `n` of the activation.
macro_rules! counting_node {
    ($name:ident, $n:expr) => {
        struct $name {
            ticks: AtomicU32,
        }

        impl Node<bool> for $name {
            type Model = Climate;

            fn create(_: NodeHandle<bool>) -> Result<Self, NodeError> {
                Ok(Self {
                    ticks: AtomicU32::new(0),
                })
            }

            fn judge(&self, _: &Climate) -> Result<bool, NodeError> {
                Ok(self.ticks.fetch_add(1, Ordering::SeqCst) + 1 >= $n)
            }
        }
    };
}

// ====================================================================
// Graph walks
// ====================================================================

counting_node!(Solo, 5);

#[test]
fn test_single_node_terminates_after_five_ticks() {
    let mut context = Context::new();
    context
        .set_node::<Solo>(
            [(true, Next::Terminal), (false, Next::node::<Solo>())],
            true,
        )
        .unwrap();
    let (mut cansat, sink, sensor) =
        mission(context, ComponentManager::new(), ScriptedSensor::new("thermo"));

    let report = cansat.run().unwrap();
    assert_eq!(report.path(), vec!["Solo"]);
    assert_eq!(report.activations[0].ticks, 5);
    assert_eq!(report.activations[0].flag.as_deref(), Some("true"));
    assert_eq!(report.rows_written, 5);
    assert_eq!(sink.rows().len(), 5);
    assert_eq!(sink.header().unwrap(), vec!["thermo-seq", "thermo-temp"]);
    assert_eq!(sensor.reads(), 5);
    assert!(cansat.data_logger().is_closed());
}

counting_node!(A, 3);
counting_node!(B, 2);

#[test]
fn test_two_node_transition_logs_in_order() {
    let mut context = Context::new();
    context
        .set_node::<A>([(true, Next::node::<B>()), (false, Next::node::<A>())], true)
        .unwrap()
        .set_node::<B>([(true, Next::Terminal), (false, Next::node::<B>())], false)
        .unwrap();
    let (mut cansat, sink, _) =
        mission(context, ComponentManager::new(), ScriptedSensor::new("thermo"));

    let report = cansat.run().unwrap();
    assert_eq!(report.path(), vec!["A", "B"]);
    assert_eq!(report.rows_written, 5);
    assert_eq!(sink.column("thermo-seq"), vec!["0", "1", "2", "3", "4"]);

    let events = lifecycle(&cansat.system_logger().drain());
    let milestones: Vec<&String> = events
        .iter()
        .filter(|e| {
            e.starts_with("enter") || e.starts_with("flag-detected") || e.starts_with("exit")
        })
        .collect();
    assert_eq!(
        milestones,
        vec![
            "enter A",
            "flag-detected true A",
            "exit A",
            "enter B",
            "flag-detected true B",
            "exit B"
        ]
    );
}

#[test]
fn test_run_twice_is_rejected() {
    let mut context = Context::new();
    context
        .set_node::<Solo>(
            [(true, Next::Terminal), (false, Next::node::<Solo>())],
            true,
        )
        .unwrap();
    let (mut cansat, _, _) =
        mission(context, ComponentManager::new(), ScriptedSensor::new("thermo"));
    cansat.run().unwrap();
    assert!(matches!(cansat.run(), Err(RuntimeError::AlreadyRan)));
}

// ====================================================================
// Control threads
// ====================================================================

struct Lingering {
    handle: NodeHandle<bool>,
    ticks: AtomicU32,
}

impl Node<bool> for Lingering {
    type Model = Climate;

    fn create(handle: NodeHandle<bool>) -> Result<Self, NodeError> {
        Ok(Self {
            handle,
            ticks: AtomicU32::new(0),
        })
    }

    fn judge(&self, _: &Climate) -> Result<bool, NodeError> {
        Ok(self.ticks.fetch_add(1, Ordering::SeqCst) + 1 >= 2)
    }

    fn control(&self) -> Result<(), NodeError> {
        while !self.handle.wait_ending(Duration::from_millis(10)) {}
        thread::sleep(Duration::from_millis(200));
        Ok(())
    }
}

#[test]
fn test_exit_waits_for_slow_control() {
    let mut context = Context::new();
    context
        .set_node::<Lingering>(
            [(true, Next::Terminal), (false, Next::node::<Lingering>())],
            true,
        )
        .unwrap();
    let (cansat, _, _) = mission(context, ComponentManager::new(), ScriptedSensor::new("thermo"));
    let mut cansat = cansat.with_settings(RuntimeSettings {
        join_poll_ms: 50,
        ..RuntimeSettings::default()
    });

    let started = Instant::now();
    cansat.run().unwrap();
    assert!(started.elapsed() >= Duration::from_millis(200));

    let events = lifecycle(&cansat.system_logger().drain());
    let finished = position(&events, "control-finish Lingering");
    let exited = position(&events, "exit Lingering");
    assert!(finished < exited, "{events:?}");
    assert!(position(&events, "flag-detected true Lingering") < finished);
}

/// Records control start/end markers shared by every node.
#[derive(Default)]
struct Timeline {
    marks: Mutex<Vec<String>>,
}

impl Component for Timeline {
    fn name(&self) -> &str {
        "timeline"
    }
}

macro_rules! timed_node {
    ($name:ident, $n:expr) => {
        struct $name {
            handle: NodeHandle<bool>,
            timeline: Arc<Timeline>,
            ticks: AtomicU32,
        }

        impl Node<bool> for $name {
            type Model = Climate;

            fn create(handle: NodeHandle<bool>) -> Result<Self, NodeError> {
                let timeline = handle.component::<Timeline>("timeline")?;
                Ok(Self {
                    handle,
                    timeline,
                    ticks: AtomicU32::new(0),
                })
            }

            fn judge(&self, _: &Climate) -> Result<bool, NodeError> {
                Ok(self.ticks.fetch_add(1, Ordering::SeqCst) + 1 >= $n)
            }

            fn control(&self) -> Result<(), NodeError> {
                let name = self.handle.node_name();
                self.timeline.marks.lock().push(format!("start {name}"));
                while !self.handle.wait_ending(Duration::from_millis(5)) {}
                thread::sleep(Duration::from_millis(20));
                self.timeline.marks.lock().push(format!("end {name}"));
                Ok(())
            }
        }
    };
}

timed_node!(Ascend, 3);
timed_node!(Descend, 3);

#[test]
fn test_control_threads_never_overlap() {
    let mut context = Context::new();
    context
        .set_node::<Ascend>(
            [(true, Next::node::<Descend>()), (false, Next::node::<Ascend>())],
            true,
        )
        .unwrap()
        .set_node::<Descend>(
            [(true, Next::Terminal), (false, Next::node::<Descend>())],
            false,
        )
        .unwrap();
    let timeline = Arc::new(Timeline::default());
    let mut manager = ComponentManager::new();
    manager.insert(timeline.clone());
    let (mut cansat, _, _) = mission(context, manager, ScriptedSensor::new("thermo"));

    cansat.run().unwrap();
    assert_eq!(
        *timeline.marks.lock(),
        vec!["start Ascend", "end Ascend", "start Descend", "end Descend"]
    );
    assert!(cansat.manager().contains("RefQueue"));
    assert!(cansat.manager().contains("SystemLogger"));
}

struct Clumsy;

impl Node<bool> for Clumsy {
    type Model = Climate;

    fn create(_: NodeHandle<bool>) -> Result<Self, NodeError> {
        Ok(Clumsy)
    }

    fn judge(&self, _: &Climate) -> Result<bool, NodeError> {
        Ok(true)
    }

    fn control(&self) -> Result<(), NodeError> {
        panic!("servo jammed");
    }
}

#[test]
fn test_control_panic_reaches_catched() {
    let mut context = Context::new();
    context
        .set_node::<Clumsy>([(true, Next::Terminal)], true)
        .unwrap();
    let (mut cansat, _, _) = mission(context, ComponentManager::new(), ScriptedSensor::new("thermo"));

    match cansat.run() {
        Err(RuntimeError::Control {
            node,
            source: NodeError::Panicked(message),
        }) => {
            assert_eq!(node, "Clumsy");
            assert!(message.contains("servo jammed"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(cansat.data_logger().is_closed());
}

// ====================================================================
// Judge outcomes
// ====================================================================

/// Judge panics; control waits for the activation to end; `catched` counts
/// what it receives and re-raises.
struct Brittle {
    handle: NodeHandle<bool>,
    caught: Arc<Timeline>,
}

impl Node<bool> for Brittle {
    type Model = Climate;

    fn create(handle: NodeHandle<bool>) -> Result<Self, NodeError> {
        let caught = handle.component::<Timeline>("timeline")?;
        Ok(Self { handle, caught })
    }

    fn judge(&self, _: &Climate) -> Result<bool, NodeError> {
        panic!("gyro overflow");
    }

    fn control(&self) -> Result<(), NodeError> {
        while !self.handle.wait_ending(Duration::from_millis(5)) {}
        Ok(())
    }

    fn catched(&self, error: NodeError) -> Result<(), NodeError> {
        self.caught.marks.lock().push(error.to_string());
        Err(error)
    }
}

#[test]
fn test_judge_panic_goes_through_catched() {
    let mut context = Context::new();
    context
        .set_node::<Brittle>(
            [(true, Next::Terminal), (false, Next::node::<Brittle>())],
            true,
        )
        .unwrap();
    let timeline = Arc::new(Timeline::default());
    let mut manager = ComponentManager::new();
    manager.insert(timeline.clone());
    let (mut cansat, _, _) = mission(context, manager, ScriptedSensor::new("thermo"));

    match cansat.run() {
        Err(RuntimeError::Judge {
            node,
            source: NodeError::Panicked(message),
        }) => {
            assert_eq!(node, "Brittle");
            assert!(message.contains("gyro overflow"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let caught = timeline.marks.lock().clone();
    assert_eq!(caught.len(), 1);
    assert!(caught[0].contains("gyro overflow"));
    assert!(cansat.data_logger().is_closed());
    assert_eq!(cansat.report().activations[0].judge_errors, 1);

    let events = lifecycle(&cansat.system_logger().drain());
    let finished = position(&events, "control-finish Brittle");
    assert!(finished < position(&events, "exit Brittle"), "{events:?}");
}

struct Picky {
    checks: AtomicU32,
}

impl Node<bool> for Picky {
    type Model = Climate;

    fn create(_: NodeHandle<bool>) -> Result<Self, NodeError> {
        Ok(Self {
            checks: AtomicU32::new(0),
        })
    }

    fn judge(&self, _: &Climate) -> Result<bool, NodeError> {
        Ok(true)
    }

    fn verify(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst) + 1 >= 3
    }
}

#[test]
fn test_verify_rejects_transitions() {
    let mut context = Context::new();
    context
        .set_node::<Picky>(
            [(true, Next::Terminal), (false, Next::node::<Picky>())],
            true,
        )
        .unwrap();
    let (mut cansat, _, _) = mission(context, ComponentManager::new(), ScriptedSensor::new("thermo"));

    let report = cansat.run().unwrap();
    assert_eq!(report.activations[0].ticks, 3);
    assert_eq!(report.activations[0].rejected_transitions, 2);
}

struct Flaky {
    ticks: AtomicU32,
}

impl Node<bool> for Flaky {
    type Model = Climate;

    fn create(_: NodeHandle<bool>) -> Result<Self, NodeError> {
        Ok(Self {
            ticks: AtomicU32::new(0),
        })
    }

    fn judge(&self, climate: &Climate) -> Result<bool, NodeError> {
        match self.ticks.fetch_add(1, Ordering::SeqCst) {
            0 | 1 => Err(NodeError::failed("glitch")),
            _ => Ok(climate.value_f64("temp")? > 0.0),
        }
    }

    fn catched(&self, error: NodeError) -> Result<(), NodeError> {
        match error {
            NodeError::Failed(_) => Ok(()),
            other => Err(other),
        }
    }
}

#[test]
fn test_catched_recovers_judge_errors() {
    let mut context = Context::new();
    context
        .set_node::<Flaky>(
            [(true, Next::Terminal), (false, Next::node::<Flaky>())],
            true,
        )
        .unwrap();
    let (mut cansat, _, _) = mission(context, ComponentManager::new(), ScriptedSensor::new("thermo"));

    let report = cansat.run().unwrap();
    assert_eq!(report.activations[0].judge_errors, 2);
    assert_eq!(report.activations[0].ticks, 3);
    assert_eq!(report.rows_written, 3);
}

struct Thirsty;

impl Node<bool> for Thirsty {
    type Model = BmeClimate;

    fn create(_: NodeHandle<bool>) -> Result<Self, NodeError> {
        Ok(Thirsty)
    }

    fn judge(&self, climate: &BmeClimate) -> Result<bool, NodeError> {
        Ok(climate.value_f64("temp")? > 30.0)
    }
}

#[test]
fn test_unbound_link_stops_mission() {
    let mut context = Context::new();
    context
        .set_node::<Thirsty>(
            [(true, Next::Terminal), (false, Next::node::<Thirsty>())],
            true,
        )
        .unwrap();
    let (mut cansat, _, sensor) =
        mission(context, ComponentManager::new(), ScriptedSensor::new("gps"));

    match cansat.run() {
        Err(RuntimeError::Judge {
            node,
            source: NodeError::Model(ModelError::LinkNotBound { field, publisher }),
        }) => {
            assert_eq!(node, "Thirsty");
            assert_eq!((field.as_str(), publisher.as_str()), ("temp", "bme"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(sensor.reads(), 1);
    assert!(cansat.data_logger().is_closed());
    assert_eq!(cansat.report().activations.len(), 1);
}

struct Rogue;

impl Node<i32> for Rogue {
    type Model = Climate;

    fn create(_: NodeHandle<i32>) -> Result<Self, NodeError> {
        Ok(Rogue)
    }

    fn judge(&self, _: &Climate) -> Result<i32, NodeError> {
        Ok(42)
    }
}

#[test]
fn test_unknown_flag_fails_fast() {
    let mut context = Context::new();
    context
        .set_node::<Rogue>([(0, Next::node::<Rogue>()), (1, Next::Terminal)], true)
        .unwrap();
    let (mut cansat, sink, sensor) =
        mission(context, ComponentManager::new(), ScriptedSensor::new("thermo"));

    match cansat.run() {
        Err(RuntimeError::Context(ContextError::UnknownFlag { node, flag })) => {
            assert_eq!(node, "Rogue");
            assert_eq!(flag, "42");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(sensor.reads(), 1);
    assert_eq!(sink.rows().len(), 1);
    assert!(cansat.data_logger().is_closed());
}

struct Needy;

impl Node<bool> for Needy {
    type Model = Climate;

    fn create(handle: NodeHandle<bool>) -> Result<Self, NodeError> {
        handle.component::<Timeline>("timeline")?;
        Ok(Needy)
    }

    fn judge(&self, _: &Climate) -> Result<bool, NodeError> {
        Ok(true)
    }
}

#[test]
fn test_create_failure_is_a_hook_error() {
    let mut context = Context::new();
    context.set_node::<Needy>([(true, Next::Terminal)], true).unwrap();
    let (mut cansat, _, sensor) =
        mission(context, ComponentManager::new(), ScriptedSensor::new("thermo"));

    assert!(matches!(
        cansat.run(),
        Err(RuntimeError::Hook {
            hook: "create",
            source: NodeError::MissingComponent(_),
            ..
        })
    ));
    assert_eq!(sensor.reads(), 0);
}

// ====================================================================
// Sensor failures and shutdown
// ====================================================================

counting_node!(Patient, 2);

fn patient_context() -> Context<bool> {
    let mut context = Context::new();
    context
        .set_node::<Patient>(
            [(true, Next::Terminal), (false, Next::node::<Patient>())],
            true,
        )
        .unwrap();
    context
}

#[test]
fn test_sensor_failures_drop_ticks_only() {
    let (mut cansat, sink, sensor) = mission(
        patient_context(),
        ComponentManager::new(),
        ScriptedSensor::new("thermo").failing_on([0, 1, 2]),
    );

    let report = cansat.run().unwrap();
    assert_eq!(report.activations[0].sensor_failures, 3);
    assert_eq!(report.activations[0].ticks, 2);
    assert_eq!(sensor.reads(), 5);
    assert_eq!(sink.column("thermo-seq"), vec!["3", "4"]);
}

#[test]
fn test_consecutive_sensor_failure_limit() {
    let (cansat, _, sensor) = mission(
        patient_context(),
        ComponentManager::new(),
        ScriptedSensor::new("thermo").failing_on(0..100),
    );
    let mut cansat = cansat.with_settings(RuntimeSettings {
        max_sensor_failures: Some(3),
        ..RuntimeSettings::default()
    });

    assert!(matches!(cansat.run(), Err(RuntimeError::Sensor(_))));
    assert_eq!(sensor.reads(), 3);
    assert_eq!(cansat.report().total_sensor_failures(), 3);
}

counting_node!(Endless, u32::MAX);

fn endless_context() -> Context<bool> {
    let mut context = Context::new();
    context
        .set_node::<Endless>(
            [(true, Next::Terminal), (false, Next::node::<Endless>())],
            true,
        )
        .unwrap();
    context
}

#[test]
fn test_log_write_failure_stops_mission() {
    let queue = LogQueue::with_sub_capacity(Box::new(FailingSink::after(1)), 1, 1).unwrap();
    let sensor = Arc::new(ScriptedSensor::new("thermo"));
    let mut logger = DataLogger::new(LoggerConfig::default()).with_queue(queue);
    logger.add_sensor(sensor.clone());
    let mut cansat = CanSat::new(endless_context(), ComponentManager::new(), logger);

    assert!(matches!(
        cansat.run(),
        Err(RuntimeError::Log(LogError::WriterFailed(_)))
    ));
    // the third tick hands the failing row over; the fourth append sees the failure
    assert_eq!(cansat.report().total_ticks(), 3);
    assert_eq!(sensor.reads(), 4);
    assert!(cansat.data_logger().is_closed());
    assert_eq!(cansat.report().activations.len(), 1);
}

#[test]
fn test_shutdown_request_stops_and_closes() {
    let (cansat, sink, _) = mission(
        endless_context(),
        ComponentManager::new(),
        ScriptedSensor::new("thermo"),
    );
    let mut cansat = cansat.with_settings(RuntimeSettings {
        tick_interval_ms: Some(2),
        ..RuntimeSettings::default()
    });

    let shutdown = cansat.shutdown_handle();
    let trigger = thread::spawn(move || {
        thread::sleep(Duration::from_millis(60));
        shutdown.request();
    });

    assert!(matches!(cansat.run(), Err(RuntimeError::Shutdown)));
    trigger.join().unwrap();
    assert!(cansat.data_logger().is_closed());
    let ticks = cansat.report().total_ticks();
    assert!(ticks > 0);
    assert_eq!(sink.rows().len() as u64, ticks);
    assert_eq!(
        cansat
            .system_logger()
            .drain()
            .iter()
            .filter(|e| e.lifecycle() == Some(&Lifecycle::Exit))
            .count(),
        1
    );
}
