//! Off-chain price attestation sources

mod hermes;

pub use hermes::HermesClient;

use async_trait::async_trait;

use crate::error::OracleResult;
use crate::types::{PriceFeedId, PriceUpdatePayload};

/// Trait for signed price-update sources
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Get the source name
    fn name(&self) -> &'static str;

    /// Fetch fresh update blobs for `feed_ids`, in request order. No retries.
    async fn fetch_updates(&self, feed_ids: &[PriceFeedId]) -> OracleResult<PriceUpdatePayload>;
}
