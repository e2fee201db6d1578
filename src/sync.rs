//! Price synchronization
//!
//! Runs one sync request as a small state machine:
//!
//! - `CachedLookup`: read every configured token from the oracle cache. Done
//!   when enough prices are valid, or after the single post-refresh re-read.
//! - `NeedsRefresh`: one Hermes fetch for the whole token set, one
//!   `updatePriceFeeds` submission, then back to `CachedLookup` once.
//! - `Done`: every configured token gets a [`NormalizedPrice`], valid or not.
//!
//! Only a failure of the first cached lookup propagates. Refresh failures fall
//! back to the cached results already in hand.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SyncConfig;
use crate::error::{OracleError, OracleResult};
use crate::feed::FeedSource;
use crate::oracle::{format_price, OracleReader, OracleWriter};
use crate::types::{ContractInfo, NormalizedPrice, Token, UpdateReceipt};

/// How a sync decides that cached prices are good enough
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPolicy {
    /// Valid cached prices needed to skip the refresh; 0 accepts any cache state
    pub min_valid_prices: usize,
    /// Pause after a confirmed update before the re-read
    pub settle_delay: Duration,
    /// Upper bound for the whole sync
    pub timeout: Option<Duration>,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            min_valid_prices: 1,
            settle_delay: Duration::ZERO,
            timeout: None,
        }
    }
}

impl From<&SyncConfig> for SyncPolicy {
    fn from(config: &SyncConfig) -> Self {
        Self {
            min_valid_prices: config.min_valid_prices,
            settle_delay: config.settle_delay(),
            timeout: config.sync_timeout(),
        }
    }
}

/// What happened to the on-chain cache during a sync
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Cached prices satisfied the policy
    NotNeeded,
    /// Cached prices were insufficient but no signer is configured
    ReadOnly,
    /// An update was confirmed and the cache re-read
    Updated(UpdateReceipt),
    /// Fetching or submitting the update failed; cached results were kept
    Failed(OracleError),
}

/// Result of one sync: a price for every configured token
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub prices: BTreeMap<Token, NormalizedPrice>,
    pub refresh: RefreshOutcome,
}

impl SyncReport {
    pub fn valid_count(&self) -> usize {
        self.prices.values().filter(|p| p.is_valid).count()
    }

    pub fn price(&self, token: Token) -> Option<&NormalizedPrice> {
        self.prices.get(&token)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    CachedLookup { after_refresh: bool },
    NeedsRefresh,
    Done,
}

/// Orchestrates cached reads, Hermes fetches and update submissions
pub struct PriceSyncController {
    reader: Arc<dyn OracleReader>,
    feed: Arc<dyn FeedSource>,
    writer: Option<Arc<dyn OracleWriter>>,
    tokens: Vec<Token>,
    policy: SyncPolicy,
}

impl PriceSyncController {
    /// `writer: None` runs in read-only mode
    pub fn new(
        reader: Arc<dyn OracleReader>,
        feed: Arc<dyn FeedSource>,
        writer: Option<Arc<dyn OracleWriter>>,
        tokens: Vec<Token>,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            reader,
            feed,
            writer,
            tokens,
            policy,
        }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn is_read_only(&self) -> bool {
        self.writer.is_none()
    }

    /// Run one sync, bounded by the policy timeout when set
    pub async fn sync(&self) -> OracleResult<SyncReport> {
        match self.policy.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run())
                .await
                .map_err(|_| {
                    OracleError::ChainCallFailed(format!("price sync timed out after {:?}", limit))
                })?,
            None => self.run().await,
        }
    }

    async fn run(&self) -> OracleResult<SyncReport> {
        let mut state = SyncState::CachedLookup {
            after_refresh: false,
        };
        let mut prices: BTreeMap<Token, NormalizedPrice> = BTreeMap::new();
        let mut refresh = RefreshOutcome::NotNeeded;

        loop {
            tracing::debug!(state = ?state, "Price sync step");
            state = match state {
                SyncState::CachedLookup { after_refresh } => {
                    match self.cached_lookup().await {
                        Ok(fresh) => prices = fresh,
                        Err(e) if !after_refresh => return Err(e),
                        Err(e) => {
                            tracing::warn!(error = %e, "Re-read after update failed, keeping earlier results");
                        }
                    }

                    let valid = prices.values().filter(|p| p.is_valid).count();
                    if after_refresh || valid >= self.policy.min_valid_prices {
                        SyncState::Done
                    } else if self.writer.is_none() {
                        tracing::info!(
                            valid = valid,
                            total = self.tokens.len(),
                            "ℹ️ Cached prices insufficient and no signer configured (read-only)"
                        );
                        refresh = RefreshOutcome::ReadOnly;
                        SyncState::Done
                    } else {
                        tracing::info!(
                            valid = valid,
                            required = self.policy.min_valid_prices,
                            "Cached prices insufficient, refreshing"
                        );
                        SyncState::NeedsRefresh
                    }
                }
                SyncState::NeedsRefresh => match self.refresh().await {
                    Ok(receipt) => {
                        refresh = RefreshOutcome::Updated(receipt);
                        if !self.policy.settle_delay.is_zero() {
                            tracing::info!(delay = ?self.policy.settle_delay, "⏳ Waiting for prices to settle");
                            tokio::time::sleep(self.policy.settle_delay).await;
                        }
                        SyncState::CachedLookup {
                            after_refresh: true,
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            retryable = e.is_retryable(),
                            "Price refresh failed, returning cached results"
                        );
                        refresh = RefreshOutcome::Failed(e);
                        SyncState::Done
                    }
                },
                SyncState::Done => {
                    let report = SyncReport { prices, refresh };
                    tracing::info!(
                        valid = report.valid_count(),
                        total = report.prices.len(),
                        "📈 Price sync complete"
                    );
                    return Ok(report);
                }
            };
        }
    }

    /// Read and normalize every configured token; per-token failures become invalid prices
    async fn cached_lookup(&self) -> OracleResult<BTreeMap<Token, NormalizedPrice>> {
        let mut cached = self.reader.get_all_cached_prices(&self.tokens).await?;

        Ok(self
            .tokens
            .iter()
            .map(|token| {
                let price = match cached.remove(token) {
                    Some(Ok(raw)) => format_price(&raw),
                    Some(Err(e)) => NormalizedPrice::unavailable(e.to_string()),
                    None => NormalizedPrice::unavailable("no result returned for token"),
                };
                (*token, price)
            })
            .collect())
    }

    async fn refresh(&self) -> OracleResult<UpdateReceipt> {
        let writer = self.writer.as_ref().ok_or(OracleError::NoSigningIdentity)?;
        tracing::info!(
            source = self.feed.name(),
            tokens = self.tokens.len(),
            "🔄 Refreshing on-chain prices"
        );
        let payload = self
            .feed
            .fetch_updates(&Token::feed_ids(&self.tokens))
            .await?;
        writer.submit_update(&payload).await
    }

    /// Single-token cached price, formatted
    pub async fn price(&self, token: Token) -> NormalizedPrice {
        match self.reader.get_cached_price(token).await {
            Ok(raw) => format_price(&raw),
            Err(e) => NormalizedPrice::unavailable(e.to_string()),
        }
    }

    /// Tokens the contract reports as older than `max_age_secs`; read errors count as stale
    pub async fn stale_tokens(&self, max_age_secs: u64) -> Vec<Token> {
        let mut stale = Vec::new();
        for token in &self.tokens {
            match self.reader.is_stale(*token, max_age_secs).await {
                Ok(false) => {}
                Ok(true) => stale.push(*token),
                Err(e) => {
                    tracing::warn!(token = %token, error = %e, "Staleness check failed");
                    stale.push(*token);
                }
            }
        }
        stale
    }

    pub async fn contract_info(&self) -> OracleResult<ContractInfo> {
        self.reader.get_contract_info().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_from_config() {
        let config = crate::config::AppConfig::defaults().unwrap();
        let policy = SyncPolicy::from(&config.sync);
        assert_eq!(policy.min_valid_prices, 1);
        assert_eq!(policy.settle_delay, Duration::from_millis(3000));
        assert_eq!(policy.timeout, None);
    }
}
