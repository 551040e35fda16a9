//! `draingate drain <device> <interface>` — admission check, exemption
//! policy, then the actual drain through the automation runner.
//!
//! Dry-run by default; `--no-dry-run` makes the runner commit the change.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::{self, PolicyConfig};
use crate::executor::{ActionParams, JobExecutor, JobOrchestrator, RunnerClient};
use crate::report::Report;

pub const AUDIT_NAME: &str = "DC Drain";

pub fn run(
    device: &str,
    interface: &str,
    threshold: Option<f64>,
    no_dry_run: bool,
    config_path: Option<&Path>,
) -> Result<Report> {
    let config = config::load(config_path)?;
    let threshold =
        super::validate_threshold(threshold.unwrap_or(config.policy.default_threshold))?;
    let dry_run = !no_dry_run;

    // Probe live state when a gateway is configured; otherwise the
    // inventory's recorded peer status has to do.
    let use_probe = config.gateway.url.is_some();
    if !use_probe {
        warn!("no gateway configured, draining on inventory state only");
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let (report, snapshot) = super::run_admission(
            AUDIT_NAME, &config, device, interface, threshold, use_probe,
        )
        .await?;
        if !report.passed() {
            return Ok(report);
        }

        let peer_name = snapshot
            .as_ref()
            .and_then(|s| s.interface(interface))
            .map(|i| i.peer_name.clone())
            .unwrap_or_default();

        // An exempt device never needs the runner, so missing credentials
        // only fail the report once a job would actually be submitted.
        let runner = match config.runner.credentials() {
            Ok((url, token)) => Some(RunnerClient::new(url, token, &config.runner.project)?),
            Err(_) => None,
        };
        let params = ActionParams {
            device: device.to_string(),
            interface: interface.to_string(),
            dry_run,
            undrain: false,
        };
        Ok(finish_drain(
            report,
            runner.as_ref().map(|r| r as &dyn JobExecutor),
            &config.policy,
            Duration::from_secs(config.runner.poll_interval_secs),
            Duration::from_secs(config.runner.max_wait_secs),
            params,
            &peer_name,
        )
        .await)
    })
}

/// Apply drain policy to an admitted link and, unless exempt, submit the
/// drain job and fold its outcome into the report.
pub(crate) async fn finish_drain(
    mut report: Report,
    executor: Option<&dyn JobExecutor>,
    policy: &PolicyConfig,
    poll_interval: Duration,
    max_wait: Duration,
    params: ActionParams,
    peer_name: &str,
) -> Report {
    if policy.blocks_auto_drain(&params.device, peer_name) {
        info!(device = %params.device, "device is drain-exempt, not submitting a job");
        report.set("auto-drain", false);
        report.set(
            "message",
            format!(
                "Device {} is exempt from auto-draining; drain admitted but not attempted",
                params.device
            ),
        );
        return report;
    }

    let Some(executor) = executor else {
        warn!("runner not configured, unable to auto-drain");
        report.set("auto-drain", false);
        report.set(
            "error",
            "runner.url and runner.token must both be configured to submit jobs",
        );
        report.set_passed(false);
        return report;
    };

    info!(
        device = %params.device,
        interface = %params.interface,
        dry_run = params.dry_run,
        "submitting drain job"
    );
    report.set("dry_run", params.dry_run);

    let orchestrator = JobOrchestrator::new(executor, poll_interval, max_wait);
    match orchestrator.submit_and_await(&params).await {
        Ok(result) => {
            report.set("job_id", result.job_id);
            report.set("auto-drained", result.passed);
            if result.passed {
                report.set(
                    "message",
                    format!(
                        "This interface has been auto-drained. Run `draingate undrain {} {}` to restore",
                        params.device, params.interface
                    ),
                );
            } else {
                report.set("message", result.message);
            }
            report.set_passed(result.passed);
        }
        Err(e) => {
            warn!(error = %e, "drain job failed");
            report.set("error", format!("Failed to auto-drain: {e}"));
            report.set_passed(false);
        }
    }
    report
}
