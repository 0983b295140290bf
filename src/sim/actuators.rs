//! actuators.rs
//! Simulated DC motors and a two-wheel drive group.

use crate::component::{Component, ComponentKind};
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;

/// H-bridge driven DC motor; duty in -1.0..=1.0, sign is direction.
pub struct SimMotor {
    name: String,
    duty: Mutex<f64>,
}

impl SimMotor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            duty: Mutex::new(0.0),
        }
    }

    /// Clamps to the valid range and returns the applied duty.
    pub fn set_duty(&self, duty: f64) -> f64 {
        let applied = duty.clamp(-1.0, 1.0);
        *self.duty.lock() = applied;
        debug!("[{}] duty {:.2}", self.name, applied);
        applied
    }

    pub fn duty(&self) -> f64 {
        *self.duty.lock()
    }

    pub fn stop(&self) {
        self.set_duty(0.0);
    }
}

impl Component for SimMotor {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Actuator
    }
}

/// Left/right motor pair; a recursive append registers both motors too.
pub struct TwoWheelDrive {
    name: String,
    left: Arc<SimMotor>,
    right: Arc<SimMotor>,
}

impl TwoWheelDrive {
    pub fn new(name: impl Into<String>, left: Arc<SimMotor>, right: Arc<SimMotor>) -> Self {
        Self {
            name: name.into(),
            left,
            right,
        }
    }

    pub fn drive(&self, left: f64, right: f64) {
        self.left.set_duty(left);
        self.right.set_duty(right);
    }

    /// Same duty on both wheels.
    pub fn forward(&self, duty: f64) {
        self.drive(duty, duty);
    }

    pub fn stop(&self) {
        self.left.stop();
        self.right.stop();
    }

    pub fn duties(&self) -> (f64, f64) {
        (self.left.duty(), self.right.duty())
    }
}

impl Component for TwoWheelDrive {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Custom("drive")
    }

    fn members(&self) -> Vec<Arc<dyn Component>> {
        vec![
            Arc::clone(&self.left) as Arc<dyn Component>,
            Arc::clone(&self.right) as Arc<dyn Component>,
        ]
    }
}
