//! Configuration, loaded from a TOML file with `DRAINGATE_` environment
//! overrides (e.g. `DRAINGATE_RUNNER__TOKEN` for `runner.token`).

use anyhow::{bail, Context, Result};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    pub url: Option<String>,
}

impl InventoryConfig {
    pub fn url(&self) -> Result<&str> {
        match self.url.as_deref() {
            Some(url) => Ok(url),
            None => bail!("inventory.url is not configured"),
        }
    }
}

/// Device API gateway used for live interface state. Optional: without it,
/// evaluation falls back to the inventory's recorded peer status.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            url: None,
            token: None,
            project: default_project(),
            poll_interval_secs: default_poll_interval(),
            max_wait_secs: default_max_wait(),
        }
    }
}

impl RunnerConfig {
    /// Fail closed: no job is ever submitted without both url and token.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        match (self.url.as_deref(), self.token.as_deref()) {
            (Some(url), Some(token)) => Ok((url, token)),
            _ => bail!("runner.url and runner.token must both be configured to submit jobs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
    /// Devices never auto-drained unless the target's peer matches
    /// `required_peer_prefix`.
    #[serde(default)]
    pub exempt_devices: Vec<String>,
    #[serde(default = "default_peer_prefix")]
    pub required_peer_prefix: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig {
            default_threshold: default_threshold(),
            exempt_devices: Vec::new(),
            required_peer_prefix: default_peer_prefix(),
        }
    }
}

impl PolicyConfig {
    /// Whether the exemption rule blocks auto-draining this device.
    pub fn blocks_auto_drain(&self, device: &str, peer_name: &str) -> bool {
        self.exempt_devices.iter().any(|d| d == device)
            && !peer_name.starts_with(&self.required_peer_prefix)
    }
}

fn default_project() -> String {
    "network-automation".to_string()
}

fn default_poll_interval() -> u64 {
    10
}

fn default_max_wait() -> u64 {
    600
}

fn default_threshold() -> f64 {
    0.5
}

fn default_peer_prefix() -> String {
    "rs".to_string()
}

pub fn default_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("could not determine config directory")?;
    Ok(config_dir.join("draingate").join("config.toml"))
}

/// Load config from `path` (or the default location), then apply
/// `DRAINGATE_` environment overrides. A missing file yields defaults.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_path()?,
    };
    let mut figment = Figment::new();
    if path.exists() {
        figment = figment.merge(Toml::file(&path));
    }
    figment
        .merge(Env::prefixed("DRAINGATE_").split("__"))
        .extract()
        .with_context(|| format!("loading config from {}", path.display()))
}
