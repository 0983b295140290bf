//! Sample persistence and mission event logging.

pub mod data_logger;
pub mod log_queue;
pub mod ref_queue;
pub mod sink;
pub mod system_logger;

pub use data_logger::DataLogger;
pub use log_queue::{LogQueue, sub_capacity_for};
pub use ref_queue::RefQueue;
pub use sink::{CsvSink, RowSink};
pub use system_logger::{
    EventKind, Lifecycle, SystemEvent, SystemLogger, init_logging, init_logging_to_file,
};
