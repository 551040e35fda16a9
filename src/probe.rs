//! Live interface state, read from the device side through the API gateway.
//!
//! The inventory only knows what it was told; the probe catches links that
//! are administratively enabled but actually down.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("device probe failed: {0}")]
    Transport(String),
    #[error("device gateway rejected credentials: {0}")]
    Auth(String),
    #[error("unexpected probe response: {0}")]
    Payload(String),
}

/// Operational state of one interface as the device itself reports it.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LinkState {
    pub is_enabled: bool,
    pub is_up: bool,
}

impl LinkState {
    /// Enabled but not passing traffic: an outage the inventory has not
    /// tagged yet.
    pub fn is_silently_down(&self) -> bool {
        self.is_enabled && !self.is_up
    }
}

/// Per-interface live state keyed by interface name.
pub type LiveStates = HashMap<String, LinkState>;

#[async_trait]
pub trait LiveStateProbe: Send + Sync {
    async fn probe(&self, address: &str) -> Result<LiveStates, ProbeError>;
}

pub struct GatewayProbe {
    base_url: String,
    http: Client,
}

impl GatewayProbe {
    pub fn new(base_url: &str) -> Result<Self, ProbeError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ProbeError::Transport(format!("building HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl LiveStateProbe for GatewayProbe {
    async fn probe(&self, address: &str) -> Result<LiveStates, ProbeError> {
        let url = format!("{}/api/v1/devices/{}/interfaces", self.base_url, address);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ProbeError::Transport(format!("GET {url}: {e}")))?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ProbeError::Auth(format!("{url} returned {}", resp.status())))
            }
            s if !s.is_success() => {
                return Err(ProbeError::Transport(format!("{url} returned {s}")))
            }
            _ => {}
        }

        resp.json::<LiveStates>()
            .await
            .map_err(|e| ProbeError::Payload(format!("parsing response from {url}: {e}")))
    }
}
