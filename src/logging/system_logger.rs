//! system_logger.rs
//! Mission-level event log.
//! - Every event goes to the `log` facade under target `cansat::system`
//! - A bounded lock-free history (ArrayQueue, drop-oldest) keeps structured copies for tooling and tests

use crate::{
    component::{Component, ComponentKind},
    error::ConfigError,
};
use chrono::{DateTime, Local};
use crossbeam_queue::ArrayQueue;
use env_logger::{Builder, Env, Target};
use log::{Level, debug, info, log};
use std::{
    fmt,
    fs::{File, create_dir_all},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

pub const TARGET: &str = "cansat::system";
pub const HISTORY_CAPACITY: usize = 4096;

/// Fixed per-activation events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    Enter,
    JudgeStart,
    FlagDetected(String),
    JudgeFinish,
    ControlStart,
    ControlFinish,
    Exit,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Enter => f.write_str("enter"),
            Lifecycle::JudgeStart => f.write_str("judge-start"),
            Lifecycle::FlagDetected(flag) => write!(f, "flag-detected {}", flag),
            Lifecycle::JudgeFinish => f.write_str("judge-finish"),
            Lifecycle::ControlStart => f.write_str("control-start"),
            Lifecycle::ControlFinish => f.write_str("control-finish"),
            Lifecycle::Exit => f.write_str("exit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Lifecycle(Lifecycle),
    Message { level: Level, text: String },
}

#[derive(Debug, Clone)]
pub struct SystemEvent {
    pub seq: u64,
    pub at: DateTime<Local>,
    pub node: Option<&'static str>,
    pub kind: EventKind,
}

impl SystemEvent {
    pub fn lifecycle(&self) -> Option<&Lifecycle> {
        match &self.kind {
            EventKind::Lifecycle(ev) => Some(ev),
            EventKind::Message { .. } => None,
        }
    }
}

impl fmt::Display for SystemEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, self.node) {
            (EventKind::Lifecycle(ev), Some(node)) => write!(f, "{} {}", ev, node),
            (EventKind::Lifecycle(ev), None) => write!(f, "{}", ev),
            (EventKind::Message { text, .. }, _) => f.write_str(text),
        }
    }
}

/// Cheap to clone; clones share the history.
#[derive(Clone)]
pub struct SystemLogger {
    history: Arc<ArrayQueue<SystemEvent>>,
    seq: Arc<AtomicU64>,
}

impl Default for SystemLogger {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl SystemLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            history: Arc::new(ArrayQueue::new(capacity.max(1))),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    fn record(&self, node: Option<&'static str>, kind: EventKind) {
        let event = SystemEvent {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            at: Local::now(),
            node,
            kind,
        };
        // full history: drop the oldest
        self.history.force_push(event);
    }

    pub fn lifecycle(&self, node: &'static str, event: Lifecycle) {
        info!(target: TARGET, "[{}] {}", node, event);
        self.record(Some(node), EventKind::Lifecycle(event));
    }

    pub fn message(&self, level: Level, text: impl Into<String>) {
        let text = text.into();
        log!(target: TARGET, level, "{}", text);
        self.record(None, EventKind::Message { level, text });
    }

    pub fn info(&self, text: impl Into<String>) {
        self.message(Level::Info, text);
    }

    pub fn warn(&self, text: impl Into<String>) {
        self.message(Level::Warn, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.message(Level::Error, text);
    }

    /// Takes every retained event out of the history, oldest first.
    pub fn drain(&self) -> Vec<SystemEvent> {
        let mut events = Vec::with_capacity(self.history.len());
        while let Some(event) = self.history.pop() {
            events.push(event);
        }
        events.sort_by_key(|e| e.seq);
        events
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

impl fmt::Debug for SystemLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemLogger")
            .field("retained", &self.history.len())
            .field("capacity", &self.history.capacity())
            .finish()
    }
}

impl Component for SystemLogger {
    fn name(&self) -> &str {
        "SystemLogger"
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Logger
    }
}

fn builder() -> Builder {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    builder
}

/// Initialises `env_logger` for binaries: `RUST_LOG` wins, default `info`.
pub fn init_logging() -> Result<(), ConfigError> {
    builder()
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))?;
    debug!("logging initialised");
    Ok(())
}

/// Same as `init_logging`, but writes the text log to `path`.
pub fn init_logging_to_file(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent).map_err(|source| ConfigError::Read {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    let file = File::create(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    builder()
        .target(Target::Pipe(Box::new(file)))
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))?;
    info!(target: TARGET, "text log written to {:?}", path);
    Ok(())
}
