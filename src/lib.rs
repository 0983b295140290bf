//! # CanSat mission runtime
//!
//! A mission is a graph of node types connected by flags. For every node
//! activation the runtime samples all sensors once per tick, binds the samples
//! into the node's aggregate model, logs it, and feeds it to the node's
//! `judge`, while the node's `control` runs on its own thread.
//!
//! ## Layout
//! - `model`: sensor samples, linked aggregates, column extraction
//! - `component`: component registry and the `Sensor` capability
//! - `logging`: data logger, two-tier log queue, reference queue, system log
//! - `mission`: context graph, nodes, activation event, `CanSat` runtime
//! - `config`: TOML runtime configuration
//! - `sim`: simulated sensors and actuators

pub mod component;
pub mod config;
pub mod error;
pub mod logging;
pub mod mission;
pub mod model;
pub mod sim;
pub mod utils;

pub use component::{Component, ComponentKind, ComponentManager, Sensor};
pub use config::{LoggerConfig, RuntimeConfig, RuntimeSettings};
pub use error::{
    ConfigError, ContextError, LogError, ModelError, NodeError, RuntimeError, SensorError,
    TickError,
};
pub use logging::{DataLogger, LogQueue, RefQueue, SystemLogger};
pub use mission::{CanSat, Context, Flag, Next, Node, NodeFlow, NodeHandle, NodeKey, PostEvent};
pub use model::{
    Binding, Columns, DataModel, Derived, Field, Link, LinkedDataModel, Loggable, ModelMeta,
    Record, Scalar, Value,
};
pub use utils::metrics::MissionReport;
