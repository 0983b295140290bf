//! Per-activation mission metrics.
//!
//! The runtime thread owns one `ActivationMetrics` while a node is active and
//! moves it into the `MissionReport` when the node exits. Judge latencies are
//! kept in a capped window so long missions stay bounded.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

pub const MAX_POINTS: usize = 1_000;

/// Appends value to a bounded window; drops the oldest at capacity (FIFO).
#[inline]
pub fn push_capped(buf: &mut VecDeque<f64>, val: f64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}

/// Statistics summary for a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

/// Computes min, max, mean for a float window.
pub fn calculate_stats(data: &VecDeque<f64>) -> Option<Stats> {
    if data.is_empty() {
        return None;
    }

    let count = data.len();
    let min = data.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = data.iter().sum::<f64>() / count as f64;

    Some(Stats { min, max, mean, count })
}

/// What happened during one node activation.
#[derive(Debug, Clone)]
pub struct ActivationMetrics {
    pub node: &'static str,
    /// Successful sampling ticks handed to `judge`.
    pub ticks: u64,
    /// Ticks dropped because a sensor read failed.
    pub sensor_failures: u64,
    /// `judge` errors and panics handed to `catched`.
    pub judge_errors: u64,
    /// Transitions refused by `verify`.
    pub rejected_transitions: u64,
    /// Debug rendering of the flag that ended the activation.
    pub flag: Option<String>,
    pub duration: Duration,
    judge_us: VecDeque<f64>,
    started: Instant,
}

impl ActivationMetrics {
    pub fn new(node: &'static str) -> Self {
        Self {
            node,
            ticks: 0,
            sensor_failures: 0,
            judge_errors: 0,
            rejected_transitions: 0,
            flag: None,
            duration: Duration::ZERO,
            judge_us: VecDeque::new(),
            started: Instant::now(),
        }
    }

    pub fn record_tick(&mut self, judge_time: Duration) {
        self.ticks += 1;
        push_capped(&mut self.judge_us, judge_time.as_secs_f64() * 1e6);
    }

    /// Judge latency in microseconds over the last `MAX_POINTS` ticks.
    pub fn judge_stats(&self) -> Option<Stats> {
        calculate_stats(&self.judge_us)
    }

    pub(crate) fn finish(&mut self, flag: Option<String>) {
        self.flag = flag;
        self.duration = self.started.elapsed();
    }
}

/// Returned by `CanSat::run`: one entry per activation, in order.
#[derive(Debug, Clone, Default)]
pub struct MissionReport {
    pub activations: Vec<ActivationMetrics>,
    /// Rows the log writer persisted, header excluded.
    pub rows_written: u64,
}

impl MissionReport {
    pub fn total_ticks(&self) -> u64 {
        self.activations.iter().map(|a| a.ticks).sum()
    }

    pub fn total_sensor_failures(&self) -> u64 {
        self.activations.iter().map(|a| a.sensor_failures).sum()
    }

    /// Node names in activation order.
    pub fn path(&self) -> Vec<&'static str> {
        self.activations.iter().map(|a| a.node).collect()
    }
}
