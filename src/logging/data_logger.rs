//! data_logger.rs
//! One `read` = one timestep: sample every sensor, bind the samples into the
//! active node's aggregate, log it, and hand it back to the judge loop.

use crate::{
    component::Sensor,
    config::LoggerConfig,
    error::{LogError, SensorError, TickError},
    logging::{log_queue::LogQueue, ref_queue::RefQueue, system_logger::SystemLogger},
    model::{DataModel, LinkedDataModel, Record},
    utils::short_type_name,
};
use chrono::Local;
use log::{debug, error, info, warn};
use std::{path::PathBuf, sync::Arc};

pub struct DataLogger {
    sensors: Vec<Arc<dyn Sensor>>,
    queue: Option<Arc<LogQueue>>,
    ref_queue: RefQueue,
    config: LoggerConfig,
    system: SystemLogger,
    closed: bool,
}

impl DataLogger {
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            sensors: Vec::new(),
            queue: None,
            ref_queue: RefQueue::new(config.ref_capacity),
            config,
            system: SystemLogger::new(),
            closed: false,
        }
    }

    pub fn with_system_logger(mut self, system: SystemLogger) -> Self {
        self.system = system;
        self
    }

    /// Uses `queue` instead of creating a CSV file on the first read.
    pub fn with_queue(mut self, queue: LogQueue) -> Self {
        self.queue = Some(Arc::new(queue));
        self
    }

    /// Sensors are read in registration order. A sensor with the same name
    /// replaces the earlier one in place.
    pub fn add_sensor(&mut self, sensor: Arc<dyn Sensor>) {
        match self.sensors.iter_mut().find(|s| s.name() == sensor.name()) {
            Some(slot) => {
                warn!("sensor '{}' added twice; replacing it", sensor.name());
                *slot = sensor;
            }
            None => {
                debug!("sensor '{}' added to data logger", sensor.name());
                self.sensors.push(sensor);
            }
        }
    }

    /// Stops reading `name`. The log header keeps its columns; they are
    /// written empty from now on.
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Sensor>> {
        let index = self.sensors.iter().position(|s| s.name() == name)?;
        info!("sensor '{}' removed from data logger", name);
        Some(self.sensors.remove(index))
    }

    pub fn sensor_names(&self) -> Vec<String> {
        self.sensors.iter().map(|s| s.name().to_string()).collect()
    }

    /// Reads every sensor and returns the synced aggregate.
    ///
    /// A failing sensor aborts the tick before anything is queued.
    pub fn read<M: LinkedDataModel>(&mut self) -> Result<Arc<M>, TickError> {
        if self.closed {
            return Err(LogError::Closed.into());
        }

        let mut samples: Vec<Arc<dyn DataModel>> = Vec::with_capacity(self.sensors.len());
        for sensor in &self.sensors {
            let sample = match sensor.read() {
                Ok(sample) => sample,
                Err(e) => {
                    self.system.warn(format!("tick dropped: {}", e));
                    return Err(e.into());
                }
            };
            if sample.publisher_name() != sensor.name() {
                let e = SensorError::PublisherMismatch {
                    sensor: sensor.name().to_string(),
                    publisher: sample.publisher_name().to_string(),
                };
                self.system.warn(format!("tick dropped: {}", e));
                return Err(e.into());
            }
            samples.push(sample);
        }

        let mut aggregate = M::default();
        aggregate.sync(&samples);
        let aggregate = Arc::new(aggregate);

        let queue = self.queue_for::<M>()?;
        queue.append(Arc::clone(&aggregate) as Arc<dyn Record>)?;
        self.ref_queue.push(Arc::clone(&aggregate) as Arc<dyn Record>);
        Ok(aggregate)
    }

    fn log_path<M: LinkedDataModel>(&self) -> PathBuf {
        match &self.config.path {
            Some(path) => path.clone(),
            None => self.config.dir.join(format!(
                "{}_{}.csv",
                short_type_name::<M>(),
                Local::now().format("%Y%m%dT%H%M%S")
            )),
        }
    }

    fn queue_for<M: LinkedDataModel>(&mut self) -> Result<Arc<LogQueue>, LogError> {
        if let Some(queue) = &self.queue {
            return Ok(Arc::clone(queue));
        }
        let queue = LogQueue::create(self.log_path::<M>(), self.config.maxlen)?;
        Ok(Arc::clone(self.queue.insert(Arc::new(queue))))
    }

    /// Flushes and closes the log queue. Later reads fail with `Closed`.
    pub fn close(&mut self) -> Result<(), LogError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match &self.queue {
            Some(queue) => queue.close(),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The log queue, once the first read has created it.
    pub fn queue(&self) -> Option<Arc<LogQueue>> {
        self.queue.clone()
    }

    pub fn ref_queue(&self) -> &RefQueue {
        &self.ref_queue
    }

    pub fn system_logger(&self) -> &SystemLogger {
        &self.system
    }
}

impl Drop for DataLogger {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("data logger closed with error: {}", e);
        }
    }
}

impl std::fmt::Debug for DataLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLogger")
            .field("sensors", &self.sensor_names())
            .field("queue", &self.queue)
            .field("closed", &self.closed)
            .finish()
    }
}
