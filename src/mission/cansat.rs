//! cansat.rs
//! Mission runtime: walks the context graph, one activation per node visit.
//!
//! Activation of node N:
//! 1. `N::create`, log enter, `enter()`
//! 2. Spawn "control-{N}" running `control()`
//! 3. Judge loop on this thread: `data_logger.read()` → `judge` → `verify` on a transition;
//!    judge errors and panics go to `catched`
//! 4. Log the flag and set the event; join the control thread, warning on every poll timeout
//! 5. `exit()`, clear the event, log exit
//!
//! The data logger is closed on every way out of `run`.

use crate::{
    component::ComponentManager,
    config::{RuntimeConfig, RuntimeSettings},
    error::{ContextError, NodeError, RuntimeError, TickError},
    logging::{DataLogger, Lifecycle, SystemLogger},
    mission::{
        context::{Context, Next, NodeKey},
        event::{Flag, PostEvent},
        node::{Node, NodeHandle},
    },
    utils::{
        metrics::{ActivationMetrics, MissionReport},
        timing::{Pacer, pin_current_thread},
    },
};
use crossbeam::channel::{RecvTimeoutError, bounded};
use log::{debug, error, info, warn};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

/// External stop request, checked once per tick.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Everything an activation needs besides the graph itself.
pub(crate) struct Engine<F> {
    manager: Arc<ComponentManager>,
    data_logger: DataLogger,
    system: SystemLogger,
    event: Arc<PostEvent<F>>,
    settings: RuntimeSettings,
    shutdown: ShutdownHandle,
    report: MissionReport,
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn judge_loop<F: Flag, N: Node<F>>(
    engine: &mut Engine<F>,
    context: &Context<F>,
    node: &N,
    metrics: &mut ActivationMetrics,
) -> Result<F, RuntimeError> {
    let name = metrics.node;
    let mut pacer = engine.settings.tick_interval().map(Pacer::new);
    let mut consecutive_failures: u32 = 0;

    loop {
        if engine.shutdown.is_requested() {
            engine
                .system
                .warn(format!("shutdown requested while '{}' was active", name));
            return Err(RuntimeError::Shutdown);
        }
        if let Some(pacer) = pacer.as_mut() {
            pacer.wait();
        }

        let model = match engine.data_logger.read::<N::Model>() {
            Ok(model) => {
                consecutive_failures = 0;
                model
            }
            Err(TickError::Sensor(e)) => {
                metrics.sensor_failures += 1;
                consecutive_failures += 1;
                match engine.settings.max_sensor_failures {
                    Some(max) if consecutive_failures >= max => {
                        error!(
                            "'{}': {} consecutive sensor failures, giving up",
                            name, consecutive_failures
                        );
                        return Err(RuntimeError::Sensor(e));
                    }
                    _ => continue,
                }
            }
            Err(TickError::Log(e)) => return Err(e.into()),
        };

        let started = Instant::now();
        let judged = match panic::catch_unwind(AssertUnwindSafe(|| node.judge(&model))) {
            Ok(judged) => judged,
            Err(payload) => {
                let message = panic_message(&*payload);
                error!("judge of '{}' panicked: {}", name, message);
                Err(NodeError::Panicked(message))
            }
        };
        metrics.record_tick(started.elapsed());

        let flag = match judged {
            Ok(flag) => flag,
            Err(e) => {
                metrics.judge_errors += 1;
                warn!("judge of '{}' failed: {}", name, e);
                match node.catched(e) {
                    Ok(()) => continue,
                    Err(source) => return Err(RuntimeError::Judge { node: name, source }),
                }
            }
        };

        if context.is_transition(&flag)? {
            if node.verify() {
                return Ok(flag);
            }
            metrics.rejected_transitions += 1;
            debug!("'{}': transition on {:?} rejected by verify", name, flag);
        }
    }
}

/// Runs one activation of `N`; stored in the context as its runner.
pub(crate) fn run_activation<F: Flag, N: Node<F>>(
    engine: &mut Engine<F>,
    context: &Context<F>,
) -> Result<F, RuntimeError> {
    let name = NodeKey::of::<N>().name();
    let handle = NodeHandle::new(
        Arc::clone(&engine.manager),
        Arc::clone(&engine.event),
        engine.data_logger.ref_queue().clone(),
        engine.system.clone(),
        name,
    );
    let mut node = N::create(handle).map_err(|source| RuntimeError::Hook {
        node: name,
        hook: "create",
        source,
    })?;
    engine.system.lifecycle(name, Lifecycle::Enter);
    node.enter().map_err(|source| RuntimeError::Hook {
        node: name,
        hook: "enter",
        source,
    })?;

    let mut node = Arc::new(node);
    let mut metrics = ActivationMetrics::new(name);

    // ====================================================================
    // Control thread
    // ====================================================================
    let (done_tx, done_rx) = bounded::<()>(1);
    let control = {
        let node = Arc::clone(&node);
        let system = engine.system.clone();
        thread::Builder::new()
            .name(format!("control-{}", name))
            .spawn(move || {
                system.lifecycle(name, Lifecycle::ControlStart);
                let result = node.control();
                system.lifecycle(name, Lifecycle::ControlFinish);
                let _ = done_tx.send(());
                result
            })
            .map_err(RuntimeError::Spawn)?
    };

    // ====================================================================
    // Judge loop
    // ====================================================================
    engine.system.lifecycle(name, Lifecycle::JudgeStart);
    let judged = judge_loop::<F, N>(engine, context, node.as_ref(), &mut metrics);
    match &judged {
        Ok(flag) => {
            engine
                .system
                .lifecycle(name, Lifecycle::FlagDetected(format!("{:?}", flag)));
            engine.event.set(flag.clone());
        }
        Err(e) => {
            engine.system.error(format!("'{}' stopped judging: {}", name, e));
            engine.event.abort();
        }
    }
    engine.system.lifecycle(name, Lifecycle::JudgeFinish);

    // ====================================================================
    // Join: never abandon the control thread
    // ====================================================================
    let poll = engine.settings.join_poll();
    let mut waited = Duration::ZERO;
    loop {
        match done_rx.recv_timeout(poll) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                waited += poll;
                warn!(
                    "control thread of '{}' still running after {:?}; waiting",
                    name, waited
                );
            }
        }
    }
    let control_result = match control.join() {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(&*panic);
            error!("control thread of '{}' panicked: {}", name, message);
            Err(NodeError::Panicked(message))
        }
    };
    let controlled = match control_result {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!("control of '{}' failed: {}", name, e);
            node.catched(e)
                .map_err(|source| RuntimeError::Control { node: name, source })
        }
    };

    let exited = match Arc::get_mut(&mut node) {
        Some(node) => node.exit().map_err(|source| RuntimeError::Hook {
            node: name,
            hook: "exit",
            source,
        }),
        None => {
            warn!("'{}' is still shared after join; skipping exit", name);
            Ok(())
        }
    };
    engine.event.clear();
    engine.system.lifecycle(name, Lifecycle::Exit);

    metrics.finish(judged.as_ref().ok().map(|flag| format!("{:?}", flag)));
    engine.report.activations.push(metrics);

    let flag = judged?;
    controlled?;
    exited?;
    Ok(flag)
}

/// The mission: a context graph plus the components and logger it runs on.
pub struct CanSat<F: Flag> {
    context: Context<F>,
    engine: Engine<F>,
    ran: bool,
}

impl<F: Flag> CanSat<F> {
    /// Freezes `manager` and registers the logger's `RefQueue` and
    /// `SystemLogger` in it.
    pub fn new(context: Context<F>, mut manager: ComponentManager, data_logger: DataLogger) -> Self {
        let system = data_logger.system_logger().clone();
        manager.insert(Arc::new(data_logger.ref_queue().clone()));
        manager.insert(Arc::new(system.clone()));
        Self {
            context,
            engine: Engine {
                manager: Arc::new(manager),
                data_logger,
                system,
                event: Arc::new(PostEvent::new()),
                settings: RuntimeSettings::default(),
                shutdown: ShutdownHandle::new(),
                report: MissionReport::default(),
            },
            ran: false,
        }
    }

    /// Builds the data logger from `config` and applies its runtime settings.
    pub fn from_config(context: Context<F>, manager: ComponentManager, config: &RuntimeConfig) -> Self {
        Self::new(context, manager, DataLogger::new(config.logger.clone()))
            .with_settings(config.runtime.clone())
    }

    pub fn with_settings(mut self, settings: RuntimeSettings) -> Self {
        self.engine.settings = settings;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.engine.shutdown.clone()
    }

    pub fn context(&self) -> &Context<F> {
        &self.context
    }

    pub fn manager(&self) -> &Arc<ComponentManager> {
        &self.engine.manager
    }

    pub fn data_logger(&self) -> &DataLogger {
        &self.engine.data_logger
    }

    /// Sensors can only be added before `run`.
    pub fn data_logger_mut(&mut self) -> &mut DataLogger {
        &mut self.engine.data_logger
    }

    pub fn system_logger(&self) -> &SystemLogger {
        &self.engine.system
    }

    /// Activations recorded so far, including a failed run's.
    pub fn report(&self) -> &MissionReport {
        &self.engine.report
    }

    /// Runs the mission to a terminal flag or the first fatal error.
    pub fn run(&mut self) -> Result<MissionReport, RuntimeError> {
        if self.ran {
            return Err(RuntimeError::AlreadyRan);
        }
        self.ran = true;

        let outcome = self.run_graph();
        let closed = self.engine.data_logger.close();
        self.engine.report.rows_written = self
            .engine
            .data_logger
            .queue()
            .map(|queue| queue.written())
            .unwrap_or(0);

        match (outcome, closed) {
            (Ok(()), Ok(())) => {
                info!(
                    "mission complete: {} activations, {} rows written",
                    self.engine.report.activations.len(),
                    self.engine.report.rows_written
                );
                Ok(self.engine.report.clone())
            }
            (Ok(()), Err(e)) => Err(e.into()),
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    error!("data logger failed to close: {}", close_err);
                }
                error!("mission stopped: {}", e);
                Err(e)
            }
        }
    }

    fn run_graph(&mut self) -> Result<(), RuntimeError> {
        self.context.validate()?;
        self.context.reset();
        if let Some(core) = self.engine.settings.pin_core {
            pin_current_thread(core);
        }

        loop {
            let key = self.context.current().ok_or(ContextError::NoStart)?;
            let runner = self.context.runner(&key).ok_or(ContextError::UnknownNode {
                from: "<current>",
                to: key.name(),
            })?;
            let flag = runner(&mut self.engine, &self.context)?;
            match self.context.next(&flag)? {
                Next::Terminal => {
                    info!("'{}' reached terminal on {:?}", key, flag);
                    return Ok(());
                }
                Next::Node(next) => debug!("'{}' → '{}' on {:?}", key, next, flag),
            }
        }
    }
}

impl<F: Flag> std::fmt::Debug for CanSat<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanSat")
            .field("context", &self.context)
            .field("components", &self.engine.manager)
            .field("ran", &self.ran)
            .finish()
    }
}
