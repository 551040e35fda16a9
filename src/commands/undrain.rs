//! `draingate undrain <device> <interface>` — reverse a drain.
//!
//! Restoring capacity needs no admission check; this submits the undrain
//! action and waits for the verdict.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::config;
use crate::executor::{ActionParams, JobOrchestrator, RunnerClient};
use crate::report::Report;

pub const AUDIT_NAME: &str = "DC Undrain";

pub fn run(
    device: &str,
    interface: &str,
    no_dry_run: bool,
    config_path: Option<&Path>,
) -> Result<Report> {
    let config = config::load(config_path)?;
    let dry_run = !no_dry_run;

    let mut report = Report::new(AUDIT_NAME, &format!("{device}:{interface}"));
    report.set("dry_run", dry_run);

    let (runner_url, token) = config.runner.credentials()?;
    let runner = RunnerClient::new(runner_url, token, &config.runner.project)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let orchestrator = JobOrchestrator::new(
            &runner,
            Duration::from_secs(config.runner.poll_interval_secs),
            Duration::from_secs(config.runner.max_wait_secs),
        );
        let params = ActionParams {
            device: device.to_string(),
            interface: interface.to_string(),
            dry_run,
            undrain: true,
        };
        info!(device, interface, dry_run, "submitting undrain job");

        match orchestrator.submit_and_await(&params).await {
            Ok(result) => {
                report.set("job_id", result.job_id);
                if result.passed {
                    report.set("message", "Interface has been undrained");
                } else {
                    report.set("message", result.message);
                }
                report.set_passed(result.passed);
            }
            Err(e) => {
                report.set("error", format!("Failed to undrain: {e}"));
                report.set_passed(false);
            }
        }
        Ok(report)
    })
}
