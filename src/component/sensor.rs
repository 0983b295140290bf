//! The one capability the runtime needs from a peripheral driver.

use crate::{
    component::Component,
    error::SensorError,
    model::DataModel,
};
use std::sync::Arc;

/// A component that produces one sample per `read`.
///
/// The sample's `publisher_name` must equal the sensor's `name`; the data
/// logger rejects the tick otherwise.
pub trait Sensor: Component {
    fn read(&self) -> Result<Arc<dyn DataModel>, SensorError>;
}
