//! Error kinds for the mission runtime.
//!
//! One enum per concern; `RuntimeError` is what `CanSat::run` hands back and
//! wraps the others.

use std::{io, path::PathBuf};
use thiserror::Error;

/// Reading a value out of a data model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// The linked field's publisher did not appear in the last `sync`.
    #[error("linked field '{field}' is not bound: no sample from publisher '{publisher}'")]
    LinkNotBound { field: String, publisher: String },

    #[error("model '{model}' has no field '{field}'")]
    UnknownField { model: String, field: String },

    #[error("field '{field}' is not {expected}")]
    TypeMismatch { field: String, expected: &'static str },
}

/// Failures reported by a `Sensor::read`.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor '{sensor}' read failed: {reason}")]
    ReadFailure { sensor: String, reason: String },

    /// The returned sample carries another publisher name than the sensor.
    #[error("sensor '{sensor}' published a sample as '{publisher}'")]
    PublisherMismatch { sensor: String, publisher: String },

    #[error("sensor I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SensorError {
    pub fn read_failure(sensor: impl Into<String>, reason: impl ToString) -> Self {
        SensorError::ReadFailure {
            sensor: sensor.into(),
            reason: reason.to_string(),
        }
    }
}

/// Persisting samples.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("log file I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// The writer thread hit an error earlier and refuses further rows.
    #[error("log writer failed: {0}")]
    WriterFailed(String),

    #[error("log queue is closed")]
    Closed,
}

/// One `DataLogger::read` tick.
#[derive(Debug, Error)]
pub enum TickError {
    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error(transparent)]
    Log(#[from] LogError),
}

/// Mission graph configuration and navigation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("flag {flag} is not an edge of node '{node}'")]
    UnknownFlag { node: &'static str, flag: String },

    #[error("node '{node}' has no outgoing edges")]
    DeadEnd { node: &'static str },

    #[error("start node already set to '{existing}', cannot also start at '{requested}'")]
    DuplicateStart {
        existing: &'static str,
        requested: &'static str,
    },

    #[error("no start node registered")]
    NoStart,

    #[error("node '{from}' points to unregistered node '{to}'")]
    UnknownNode { from: &'static str, to: &'static str },
}

/// Errors raised by user Node code.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("component '{0}' is not registered or has a different type")]
    MissingComponent(String),

    #[error("node panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl NodeError {
    pub fn failed(message: impl Into<String>) -> Self {
        NodeError::Failed(message.into())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),

    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

/// Everything that can stop a mission.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error("node '{node}' failed in judge: {source}")]
    Judge {
        node: &'static str,
        #[source]
        source: NodeError,
    },

    #[error("node '{node}' failed in control: {source}")]
    Control {
        node: &'static str,
        #[source]
        source: NodeError,
    },

    #[error("node '{node}' failed in {hook}: {source}")]
    Hook {
        node: &'static str,
        hook: &'static str,
        #[source]
        source: NodeError,
    },

    #[error("failed to spawn control thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("mission interrupted by shutdown signal")]
    Shutdown,

    #[error("mission already ran; build a new CanSat for another run")]
    AlreadyRan,
}

impl From<TickError> for RuntimeError {
    fn from(err: TickError) -> Self {
        match err {
            TickError::Sensor(e) => RuntimeError::Sensor(e),
            TickError::Log(e) => RuntimeError::Log(e),
        }
    }
}
