//! One module per subcommand, plus the admission plumbing they share.
//!
//! Commands build a `Report` and hand it back to `main`, which owns the
//! only process exit. Collaborator failures during an evaluation become
//! failed reports; only configuration problems surface as errors.

pub mod audit;
pub mod drain;
pub mod undrain;

use anyhow::{bail, Result};

use crate::audit::AdmissionEvaluator;
use crate::config::Config;
use crate::inventory::{Inventory, InventoryClient};
use crate::probe::{GatewayProbe, LiveStateProbe};
use crate::report::Report;
use crate::topology::Device;

pub(crate) fn validate_threshold(threshold: f64) -> Result<f64> {
    if threshold > 0.0 && threshold <= 1.0 {
        Ok(threshold)
    } else {
        bail!("threshold must be in (0, 1], got {threshold}")
    }
}

/// Fetch a fresh snapshot and run the admission evaluation, folding the
/// decision into a report. Returns the snapshot alongside so callers can
/// apply policy against it.
pub(crate) async fn run_admission(
    audit_name: &str,
    config: &Config,
    device_name: &str,
    interface: &str,
    threshold: f64,
    use_probe: bool,
) -> Result<(Report, Option<Device>)> {
    let mut report = Report::new(audit_name, &format!("{device_name}:{interface}"));
    report.set("threshold", threshold);

    let inventory = InventoryClient::new(config.inventory.url()?)?;
    let probe = match (&config.gateway.url, use_probe) {
        (Some(url), true) => Some(GatewayProbe::new(url)?),
        (None, true) => bail!("gateway.url is not configured; required for live-state probing"),
        (_, false) => None,
    };

    let snapshot = match inventory.fetch_device(device_name).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            report.set("message", format!("Failed to fetch device snapshot: {e}"));
            return Ok((report, None));
        }
    };

    let evaluator = AdmissionEvaluator::new(
        &inventory,
        probe.as_ref().map(|p| p as &dyn LiveStateProbe),
    );
    let decision = evaluator.evaluate(&snapshot, interface, threshold).await;
    report.set("message", decision.message);
    report.set_passed(decision.passed);
    Ok((report, Some(snapshot)))
}
