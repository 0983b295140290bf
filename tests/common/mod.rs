//! Shared fixtures for the integration tests: a scripted thermometer, the
//! aggregates built from it, and in-memory row sinks.
#![allow(dead_code)]

use cansat_runtime::{
    Binding, Component, ComponentKind, DataLogger, DataModel, Field, Link, LinkedDataModel,
    LogError, LogQueue, Loggable, LoggerConfig, ModelMeta, Sensor, SensorError,
    logging::RowSink,
};
use parking_lot::Mutex;
use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

// ====================================================================
// Thermometer samples
// ====================================================================

#[derive(Debug)]
pub struct Thermo {
    meta: ModelMeta,
    pub seq: u64,
    pub temp: f64,
}

impl Thermo {
    pub fn new(publisher: &str, seq: u64, temp: f64) -> Self {
        Self {
            meta: ModelMeta::new(publisher),
            seq,
            temp,
        }
    }
}

static THERMO_FIELDS: [Field<Thermo>; 2] = [
    Field::new("seq", |t: &Thermo| t.seq.into()),
    Field::new("temp", |t: &Thermo| t.temp.into()),
];

impl Loggable for Thermo {
    fn fields() -> &'static [Field<Self>] {
        &THERMO_FIELDS
    }

    fn meta(&self) -> &ModelMeta {
        &self.meta
    }
}

/// Temperature for read number `seq`.
pub fn temp_for(seq: u64) -> f64 {
    20.0 + seq as f64 * 0.25
}

/// Publishes `Thermo { seq, temp_for(seq) }`; reads listed in `fail_on` fail.
pub struct ScriptedSensor {
    name: String,
    reads: AtomicU64,
    fail_on: HashSet<u64>,
}

impl ScriptedSensor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reads: AtomicU64::new(0),
            fail_on: HashSet::new(),
        }
    }

    /// Zero-based read numbers that fail.
    pub fn failing_on(mut self, reads: impl IntoIterator<Item = u64>) -> Self {
        self.fail_on = reads.into_iter().collect();
        self
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Component for ScriptedSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Sensor
    }
}

impl Sensor for ScriptedSensor {
    fn read(&self) -> Result<Arc<dyn DataModel>, SensorError> {
        let seq = self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.contains(&seq) {
            return Err(SensorError::read_failure(&self.name, "scripted failure"));
        }
        Ok(Arc::new(Thermo::new(&self.name, seq, temp_for(seq))))
    }
}

/// Sensor whose samples claim another publisher.
pub struct Impostor;

impl Component for Impostor {
    fn name(&self) -> &str {
        "impostor"
    }
}

impl Sensor for Impostor {
    fn read(&self) -> Result<Arc<dyn DataModel>, SensorError> {
        Ok(Arc::new(Thermo::new("thermo", 0, 0.0)))
    }
}

// ====================================================================
// Aggregates
// ====================================================================

/// `seq` and `temp` of the "thermo" sensor.
#[derive(Debug, Default)]
pub struct Climate {
    binding: Binding,
}

static CLIMATE_LINKS: [Link; 2] = [
    Link::new("seq", "thermo", "seq"),
    Link::new("temp", "thermo", "temp"),
];

impl LinkedDataModel for Climate {
    fn links() -> &'static [Link] {
        &CLIMATE_LINKS
    }

    fn binding(&self) -> &Binding {
        &self.binding
    }

    fn binding_mut(&mut self) -> &mut Binding {
        &mut self.binding
    }
}

/// Temperature expected from a "bme" sensor.
#[derive(Debug, Default)]
pub struct BmeClimate {
    binding: Binding,
}

static BME_LINKS: [Link; 1] = [Link::new("temp", "bme", "temp")];

impl LinkedDataModel for BmeClimate {
    fn links() -> &'static [Link] {
        &BME_LINKS
    }

    fn binding(&self) -> &Binding {
        &self.binding
    }

    fn binding_mut(&mut self) -> &mut Binding {
        &mut self.binding
    }
}

// ====================================================================
// Sinks
// ====================================================================

/// Keeps the header and every row; clones share the rows.
#[derive(Clone, Default)]
pub struct MemorySink {
    header: Arc<Mutex<Option<Vec<String>>>>,
    rows: Arc<Mutex<Vec<Vec<String>>>>,
    delay: Duration,
}

impl MemorySink {
    /// Sleeps `delay` per row.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn header(&self) -> Option<Vec<String>> {
        self.header.lock().clone()
    }

    pub fn rows(&self) -> Vec<Vec<String>> {
        self.rows.lock().clone()
    }

    /// Cells of column `name`, one per row.
    pub fn column(&self, name: &str) -> Vec<String> {
        let Some(index) = self
            .header()
            .and_then(|h| h.iter().position(|c| c == name))
        else {
            return Vec::new();
        };
        self.rows.lock().iter().map(|r| r[index].clone()).collect()
    }
}

impl RowSink for MemorySink {
    fn write_header(&mut self, columns: &[String]) -> Result<(), LogError> {
        *self.header.lock() = Some(columns.to_vec());
        Ok(())
    }

    fn write_row(&mut self, cells: &[String]) -> Result<(), LogError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.rows.lock().push(cells.to_vec());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LogError> {
        Ok(())
    }
}

/// Accepts `limit` rows, then fails every write.
pub struct FailingSink {
    limit: usize,
    rows: usize,
}

impl FailingSink {
    pub fn after(limit: usize) -> Self {
        Self { limit, rows: 0 }
    }
}

impl RowSink for FailingSink {
    fn write_header(&mut self, _: &[String]) -> Result<(), LogError> {
        Ok(())
    }

    fn write_row(&mut self, _: &[String]) -> Result<(), LogError> {
        if self.rows >= self.limit {
            return Err(LogError::Io(std::io::Error::other("disk full")));
        }
        self.rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LogError> {
        Ok(())
    }
}

/// Data logger writing into a `MemorySink`.
pub fn memory_logger(maxlen: usize) -> (DataLogger, MemorySink) {
    let sink = MemorySink::default();
    let queue = LogQueue::with_sink(Box::new(sink.clone()), maxlen).unwrap();
    let config = LoggerConfig {
        maxlen,
        ..LoggerConfig::default()
    };
    (DataLogger::new(config).with_queue(queue), sink)
}
