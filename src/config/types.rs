//! Configuration sections

use ethers::types::Address;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{OracleError, OracleResult};
use crate::types::Token;

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint (also settable through RPC_URL)
    pub rpc_url: String,
    /// Chain id used for transaction signing (Base Sepolia = 84532)
    pub chain_id: u64,
    /// Deployed price oracle contract
    pub oracle_address: String,
    /// Per-request RPC timeout in seconds
    pub rpc_timeout_secs: u64,
}

impl NetworkConfig {
    pub fn oracle_address(&self) -> OracleResult<Address> {
        self.oracle_address.parse().map_err(|e| {
            OracleError::Config(format!(
                "invalid oracle_address '{}': {}",
                self.oracle_address, e
            ))
        })
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Hermes base URL
    pub hermes_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Tokens to report, by symbol
    pub tokens: Vec<String>,
    /// Valid cached prices needed to skip the refresh (0 = never refresh)
    pub min_valid_prices: usize,
    /// Pause between sequential per-token reads in milliseconds
    pub read_throttle_ms: u64,
    /// Issue per-token reads concurrently instead of throttled one by one
    pub parallel_reads: bool,
    /// Pause after a confirmed update before re-reading, in milliseconds
    pub settle_delay_ms: u64,
    /// Gas ceiling for updatePriceFeeds
    pub gas_limit: u64,
    /// Give the nonce back when a submission fails for reasons other than a conflict
    pub rollback_nonce_on_failure: bool,
    /// Upper bound on a whole sync in seconds (0 = unbounded)
    pub sync_timeout_secs: u64,
    /// Report tokens the contract considers older than this many seconds (0 = skip)
    pub stale_after_secs: u64,
}

impl SyncConfig {
    pub fn tokens(&self) -> OracleResult<Vec<Token>> {
        let mut tokens = Vec::with_capacity(self.tokens.len());
        for name in &self.tokens {
            let token: Token = name.parse()?;
            if !tokens.contains(&token) {
                tokens.push(token);
            }
        }
        Ok(tokens)
    }

    pub fn read_throttle(&self) -> Duration {
        Duration::from_millis(self.read_throttle_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn sync_timeout(&self) -> Option<Duration> {
        (self.sync_timeout_secs > 0).then(|| Duration::from_secs(self.sync_timeout_secs))
    }
}
