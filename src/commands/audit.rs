//! `draingate audit <device> <interface>` — audit-only admission check.
//!
//! Reads the inventory (and optionally the device itself) and reports
//! whether a drain would be admitted. Never submits a job.

use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::config;
use crate::report::Report;

pub const AUDIT_NAME: &str = "DC Drain Audit";

pub fn run(
    device: &str,
    interface: &str,
    threshold: Option<f64>,
    probe: bool,
    config_path: Option<&Path>,
) -> Result<Report> {
    let config = config::load(config_path)?;
    let threshold =
        super::validate_threshold(threshold.unwrap_or(config.policy.default_threshold))?;
    info!(device, interface, threshold, probe, "running drain audit");

    let runtime = tokio::runtime::Runtime::new()?;
    let (report, _snapshot) = runtime.block_on(super::run_admission(
        AUDIT_NAME, &config, device, interface, threshold, probe,
    ))?;
    Ok(report)
}
