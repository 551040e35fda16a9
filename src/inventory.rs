//! Typed HTTP client for the inventory's device-model API.
//!
//! Every admission decision fetches a fresh snapshot; nothing here caches.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::topology::Device;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("device '{0}' not found in inventory")]
    NotFound(String),
    #[error("inventory request failed: {0}")]
    Transport(String),
    #[error("unexpected inventory response: {0}")]
    Payload(String),
}

/// Source of point-in-time device snapshots.
#[async_trait]
pub trait Inventory: Send + Sync {
    async fn fetch_device(&self, name: &str) -> Result<Device, InventoryError>;
}

pub struct InventoryClient {
    base_url: String,
    http: Client,
}

impl InventoryClient {
    pub fn new(base_url: &str) -> Result<Self, InventoryError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| InventoryError::Transport(format!("building HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl Inventory for InventoryClient {
    async fn fetch_device(&self, name: &str) -> Result<Device, InventoryError> {
        let url = format!("{}/api/device/dm/v1/{}", self.base_url, name);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| InventoryError::Transport(format!("GET {url}: {e}")))?;

        match resp.status() {
            StatusCode::NOT_FOUND => return Err(InventoryError::NotFound(name.to_string())),
            s if !s.is_success() => {
                return Err(InventoryError::Transport(format!("{url} returned {s}")))
            }
            _ => {}
        }

        resp.json::<Device>()
            .await
            .map_err(|e| InventoryError::Payload(format!("parsing response from {url}: {e}")))
    }
}
