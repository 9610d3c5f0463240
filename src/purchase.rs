//! Entitlement checks: has this tourist bought this tour?

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, ServiceError};

#[async_trait]
pub trait PurchaseGate: Send + Sync {
    /// `TransientIo` means the answer is unknown, not that it is "no".
    async fn is_entitled(&self, tourist_id: u64, tour_id: u64) -> Result<bool>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseStatus {
    is_purchased: bool,
}

/// Asks a remote cart service for the purchase status.
#[derive(Debug, Clone)]
pub struct HttpPurchaseGate {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPurchaseGate {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ServiceError::transient(format!("http client: {err}")))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn status_url(&self, tour_id: u64) -> String {
        format!("{}/api/v1/cart/purchase-status/{tour_id}", self.base_url)
    }
}

#[async_trait]
impl PurchaseGate for HttpPurchaseGate {
    async fn is_entitled(&self, tourist_id: u64, tour_id: u64) -> Result<bool> {
        let response = self
            .client
            .get(self.status_url(tour_id))
            .header("X-User-ID", tourist_id.to_string())
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ServiceError::transient(format!(
                "cart service answered {status}"
            )));
        }
        if status != StatusCode::OK {
            debug!(
                tourist_id,
                tour_id,
                %status,
                "purchase status not available, treating as not purchased"
            );
            return Ok(false);
        }

        let body: PurchaseStatus = response
            .json()
            .await
            .map_err(|err| ServiceError::transient(format!("malformed purchase status: {err}")))?;
        Ok(body.is_purchased)
    }
}
