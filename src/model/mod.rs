//! Data-model binding layer: sensor samples, per-tick aggregates, columns.

pub mod data_model;
pub mod linked;
pub mod value;

pub use data_model::{DataModel, Field, FieldCache, Loggable, ModelMeta};
pub use linked::{Binding, Derived, Link, LinkedDataModel, Record, downcast_record};
pub use value::{Columns, Formatter, Scalar, Value, default_columns, formatters};
