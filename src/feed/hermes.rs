//! Pyth Hermes REST client
//!
//! Fetches the latest signed price updates from
//! `GET /v2/updates/price/latest?ids[]=...&encoding=hex`.

use async_trait::async_trait;
use ethers::types::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::config::FeedConfig;
use crate::error::{OracleError, OracleResult};
use crate::feed::FeedSource;
use crate::types::{PriceFeedId, PriceUpdatePayload};

const LATEST_UPDATES_PATH: &str = "/v2/updates/price/latest";

#[derive(Debug, Clone, Deserialize)]
struct LatestUpdatesResponse {
    binary: Option<BinaryUpdate>,
}

#[derive(Debug, Clone, Deserialize)]
struct BinaryUpdate {
    encoding: Option<String>,
    data: Option<Vec<String>>,
}

/// Hermes client with a bounded request timeout
pub struct HermesClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HermesClient {
    pub fn new(config: &FeedConfig) -> OracleResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| OracleError::Config(format!("failed to build Hermes client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.hermes_url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
        })
    }

    fn query(feed_ids: &[PriceFeedId]) -> Vec<(&'static str, String)> {
        let mut query: Vec<(&'static str, String)> =
            feed_ids.iter().map(|id| ("ids[]", id.to_hex())).collect();
        query.push(("encoding", "hex".to_string()));
        query
    }

    fn unavailable(&self, e: reqwest::Error) -> OracleError {
        if e.is_timeout() {
            OracleError::FeedUnavailable(format!("Hermes timed out after {:?}", self.timeout))
        } else {
            OracleError::FeedUnavailable(format!("Hermes request failed: {}", e))
        }
    }
}

/// Turn the Hermes envelope into contract-ready blobs
fn decode_updates(response: LatestUpdatesResponse) -> OracleResult<PriceUpdatePayload> {
    let binary = response.binary.ok_or_else(|| {
        OracleError::FeedUnavailable("response has no binary update envelope".to_string())
    })?;
    if let Some(encoding) = binary.encoding.as_deref() {
        if encoding != "hex" {
            return Err(OracleError::FeedUnavailable(format!(
                "unexpected update encoding '{}'",
                encoding
            )));
        }
    }

    let data = binary
        .data
        .filter(|data| !data.is_empty())
        .ok_or_else(|| OracleError::FeedUnavailable("no price update data received".to_string()))?;

    data.iter()
        .map(|blob| {
            hex::decode(blob.trim_start_matches("0x"))
                .map(Bytes::from)
                .map_err(|e| OracleError::FeedUnavailable(format!("invalid hex update: {}", e)))
        })
        .collect::<OracleResult<Vec<_>>>()
        .map(PriceUpdatePayload::new)
}

#[async_trait]
impl FeedSource for HermesClient {
    fn name(&self) -> &'static str {
        "Hermes"
    }

    async fn fetch_updates(&self, feed_ids: &[PriceFeedId]) -> OracleResult<PriceUpdatePayload> {
        if feed_ids.is_empty() {
            return Err(OracleError::FeedUnavailable(
                "no feed ids requested".to_string(),
            ));
        }

        let url = format!("{}{}", self.base_url, LATEST_UPDATES_PATH);
        tracing::info!(source = %"Hermes", feeds = feed_ids.len(), "🌐 Fetching price updates");

        let response = self
            .client
            .get(&url)
            .query(&Self::query(feed_ids))
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::FeedUnavailable(format!(
                "Hermes returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let envelope: LatestUpdatesResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.unavailable(e)
            } else {
                OracleError::FeedUnavailable(format!("malformed Hermes response: {}", e))
            }
        })?;

        let payload = decode_updates(envelope)?;
        tracing::info!(source = %"Hermes", updates = payload.len(), "✅ Got price updates");
        Ok(payload)
    }
}
