//! Mission summary export.
//!
//! Writes one row per activation: node, ticks, sensor failures, judge errors,
//! rejected transitions, judge latency stats (µs), duration and final flag.
//! Appends to an existing file so several runs can be compared; the header is
//! written only when the file is new.

use crate::{error::LogError, utils::metrics::MissionReport};
use csv::WriterBuilder;
use log::info;
use serde::Serialize;
use std::{
    fs::{OpenOptions, create_dir_all},
    path::Path,
};

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    node: &'a str,
    ticks: u64,
    sensor_failures: u64,
    judge_errors: u64,
    rejected_transitions: u64,
    judge_min_us: Option<f64>,
    judge_max_us: Option<f64>,
    judge_avg_us: Option<f64>,
    duration_ms: u128,
    flag: &'a str,
}

pub fn export_report_csv(report: &MissionReport, path: &Path) -> Result<(), LogError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }
    let file_exists = path.exists();

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    for activation in &report.activations {
        let stats = activation.judge_stats();
        writer.serialize(SummaryRow {
            node: activation.node,
            ticks: activation.ticks,
            sensor_failures: activation.sensor_failures,
            judge_errors: activation.judge_errors,
            rejected_transitions: activation.rejected_transitions,
            judge_min_us: stats.as_ref().map(|s| s.min),
            judge_max_us: stats.as_ref().map(|s| s.max),
            judge_avg_us: stats.as_ref().map(|s| s.mean),
            duration_ms: activation.duration.as_millis(),
            flag: activation.flag.as_deref().unwrap_or(""),
        })?;
    }
    writer.flush()?;

    info!("mission summary exported to {:?}", path);
    Ok(())
}
