//! sensors.rs
//! Simulated barometer, GPS and IMU with noisy readings.
//! - Each quantity has a base value and a uniform noise band
//! - The barometer follows a descent profile so missions can detect landing
//! - Optional dropout makes a read fail with the given probability

use crate::{
    component::{Component, ComponentKind, Sensor},
    error::SensorError,
    model::{DataModel, Field, Loggable, ModelMeta, Scalar, Value, formatters},
};
use log::debug;
use parking_lot::Mutex;
use rand::random_range;
use std::sync::Arc;

/// Sea-level reference pressure (hPa).
pub const SEA_LEVEL_HPA: f64 = 1013.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Temperature,
    Acceleration,
    AngularRate,
    Coordinate,
}

impl Quantity {
    pub fn base_value(&self) -> f64 {
        match self {
            Quantity::Temperature => 20.0,
            Quantity::Acceleration => 0.0,
            Quantity::AngularRate => 0.0,
            Quantity::Coordinate => 0.0,
        }
    }

    pub fn noise_range(&self) -> (f64, f64) {
        match self {
            Quantity::Temperature => (-0.2, 0.2),
            Quantity::Acceleration => (-0.05, 0.05),
            Quantity::AngularRate => (-0.5, 0.5),
            Quantity::Coordinate => (-0.00001, 0.00001),
        }
    }

    pub fn noise(&self) -> f64 {
        let (lo, hi) = self.noise_range();
        random_range(lo..hi)
    }

    pub fn sample(&self) -> f64 {
        self.base_value() + self.noise()
    }
}

/// Pressure (hPa) at `altitude` metres, international barometric formula.
pub fn pressure_at(altitude: f64) -> f64 {
    SEA_LEVEL_HPA * (1.0 - altitude / 44_330.0).powf(5.255)
}

/// Inverse of `pressure_at`.
pub fn altitude_at(pressure: f64) -> f64 {
    44_330.0 * (1.0 - (pressure / SEA_LEVEL_HPA).powf(1.0 / 5.255))
}

fn dropped(probability: f64) -> bool {
    probability > 0.0 && random_range(0.0..1.0) < probability
}

// ====================================================================
// Barometer
// ====================================================================

#[derive(Debug)]
pub struct BarometerData {
    meta: ModelMeta,
    pub pressure: f64,
    pub temperature: f64,
}

impl BarometerData {
    pub fn new(publisher: impl Into<String>, pressure: f64, temperature: f64) -> Self {
        Self {
            meta: ModelMeta::new(publisher),
            pressure,
            temperature,
        }
    }

    pub fn altitude(&self) -> f64 {
        altitude_at(self.pressure)
    }
}

static BAROMETER_FIELDS: [Field<BarometerData>; 3] = [
    Field::new("pressure", |b: &BarometerData| b.pressure.into()).formatted(formatters::centi),
    Field::new("temperature", |b: &BarometerData| b.temperature.into())
        .formatted(formatters::centi),
    Field::new("altitude", |b: &BarometerData| b.altitude().into()).cached(),
];

impl Loggable for BarometerData {
    fn fields() -> &'static [Field<Self>] {
        &BAROMETER_FIELDS
    }

    fn meta(&self) -> &ModelMeta {
        &self.meta
    }
}

/// Barometer descending at a fixed number of metres per read.
pub struct SimBarometer {
    name: String,
    altitude: Mutex<f64>,
    descent_per_read: f64,
    dropout: f64,
}

impl SimBarometer {
    pub fn new(name: impl Into<String>, start_altitude: f64, descent_per_read: f64) -> Self {
        Self {
            name: name.into(),
            altitude: Mutex::new(start_altitude.max(0.0)),
            descent_per_read,
            dropout: 0.0,
        }
    }

    /// Fails a read with `probability` (0..1).
    pub fn with_dropout(mut self, probability: f64) -> Self {
        self.dropout = probability.clamp(0.0, 1.0);
        self
    }

    /// Current true altitude of the simulated drop.
    pub fn true_altitude(&self) -> f64 {
        *self.altitude.lock()
    }
}

impl Component for SimBarometer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Sensor
    }
}

impl Sensor for SimBarometer {
    fn read(&self) -> Result<Arc<dyn DataModel>, SensorError> {
        let altitude = {
            let mut altitude = self.altitude.lock();
            *altitude = (*altitude - self.descent_per_read).max(0.0);
            *altitude
        };
        if dropped(self.dropout) {
            debug!("[{}] simulated dropout", self.name);
            return Err(SensorError::read_failure(&self.name, "i2c timeout"));
        }
        Ok(Arc::new(BarometerData::new(
            &self.name,
            pressure_at(altitude) + random_range(-0.01..0.01),
            Quantity::Temperature.sample(),
        )))
    }
}

// ====================================================================
// GPS
// ====================================================================

#[derive(Debug)]
pub struct GpsData {
    meta: ModelMeta,
    pub latitude: f64,
    pub longitude: f64,
    pub satellites: u8,
}

static GPS_FIELDS: [Field<GpsData>; 2] = [
    Field::new("fix", |g: &GpsData| {
        Value::Record(vec![
            ("lat", Scalar::Float(g.latitude)),
            ("lon", Scalar::Float(g.longitude)),
        ])
    }),
    Field::new("satellites", |g: &GpsData| g.satellites.into()),
];

impl Loggable for GpsData {
    fn fields() -> &'static [Field<Self>] {
        &GPS_FIELDS
    }

    fn meta(&self) -> &ModelMeta {
        &self.meta
    }
}

pub struct SimGps {
    name: String,
    origin: (f64, f64),
}

impl SimGps {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            origin: (latitude, longitude),
        }
    }
}

impl Component for SimGps {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Sensor
    }
}

impl Sensor for SimGps {
    fn read(&self) -> Result<Arc<dyn DataModel>, SensorError> {
        Ok(Arc::new(GpsData {
            meta: ModelMeta::new(&self.name),
            latitude: self.origin.0 + Quantity::Coordinate.noise(),
            longitude: self.origin.1 + Quantity::Coordinate.noise(),
            satellites: random_range(6..12),
        }))
    }
}

// ====================================================================
// IMU
// ====================================================================

#[derive(Debug)]
pub struct ImuData {
    meta: ModelMeta,
    pub accel: [f64; 3],
    pub gyro: [f64; 3],
}

static IMU_FIELDS: [Field<ImuData>; 2] = [
    Field::new("accel", |i: &ImuData| i.accel.into()).formatted(formatters::xyz),
    Field::new("gyro", |i: &ImuData| i.gyro.into()).formatted(formatters::xyz),
];

impl Loggable for ImuData {
    fn fields() -> &'static [Field<Self>] {
        &IMU_FIELDS
    }

    fn meta(&self) -> &ModelMeta {
        &self.meta
    }
}

pub struct SimImu {
    name: String,
}

impl SimImu {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Component for SimImu {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Sensor
    }
}

impl Sensor for SimImu {
    fn read(&self) -> Result<Arc<dyn DataModel>, SensorError> {
        let accel = Quantity::Acceleration;
        let gyro = Quantity::AngularRate;
        Ok(Arc::new(ImuData {
            meta: ModelMeta::new(&self.name),
            accel: [accel.sample(), accel.sample(), 9.81 + accel.noise()],
            gyro: [gyro.sample(), gyro.sample(), gyro.sample()],
        }))
    }
}
