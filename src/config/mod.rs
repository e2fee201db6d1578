//! Configuration management for PriceSync
//!
//! Loads from optional TOML/YAML files + environment variables via .env.
//! The signing key never lives in a config file; it is read from PRIVATE_KEY.

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub feed: FeedConfig,
    pub sync: SyncConfig,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (PRICESYNC__*)
            .add_source(
                Environment::with_prefix("PRICESYNC")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("sync.tokens")
                    .try_parsing(true),
            )
            .set_override_option("network.rpc_url", std::env::var("RPC_URL").ok())?
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app_config.validate()?;

        Ok(app_config)
    }

    /// Defaults only, no files or environment
    pub fn defaults() -> Result<Self> {
        Self::builder()?
            .build()
            .context("Failed to build default configuration")?
            .try_deserialize()
            .context("Failed to deserialize default configuration")
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            // Network defaults (Base Sepolia)
            .set_default("network.rpc_url", "https://sepolia.base.org")?
            .set_default("network.chain_id", 84532)?
            .set_default(
                "network.oracle_address",
                "0x02688C437601349b24741C24e3381763296452a7",
            )?
            .set_default("network.rpc_timeout_secs", 15)?
            // Hermes defaults
            .set_default("feed.hermes_url", "https://hermes.pyth.network")?
            .set_default("feed.timeout_secs", 15)?
            .set_default("feed.user_agent", "PriceSync-Oracle/1.0")?
            // Sync defaults
            .set_default("sync.tokens", vec!["ETH", "USDC", "USDT", "PYUSD"])?
            .set_default("sync.min_valid_prices", 1)?
            .set_default("sync.read_throttle_ms", 100)?
            .set_default("sync.parallel_reads", false)?
            .set_default("sync.settle_delay_ms", 3000)?
            .set_default("sync.gas_limit", 1_000_000)?
            .set_default("sync.rollback_nonce_on_failure", false)?
            .set_default("sync.sync_timeout_secs", 0)?
            .set_default("sync.stale_after_secs", 0)?)
    }

    /// Reject settings the clients cannot work with
    pub fn validate(&self) -> Result<()> {
        self.network
            .oracle_address()
            .context("network.oracle_address")?;
        let tokens = self.sync.tokens().context("sync.tokens")?;
        if tokens.is_empty() {
            bail!("sync.tokens must name at least one token");
        }
        if self.sync.min_valid_prices > tokens.len() {
            bail!(
                "sync.min_valid_prices ({}) exceeds the number of tokens ({})",
                self.sync.min_valid_prices,
                tokens.len()
            );
        }
        if !(10..=15).contains(&self.feed.timeout_secs) {
            bail!("feed.timeout_secs must be between 10 and 15");
        }
        if self.network.rpc_timeout_secs == 0 {
            bail!("network.rpc_timeout_secs must be positive");
        }
        if self.sync.gas_limit == 0 {
            bail!("sync.gas_limit must be positive");
        }
        Ok(())
    }

    /// Signing key from PRIVATE_KEY; `None` means read-only mode
    pub fn signing_key(&self) -> Result<Option<String>> {
        match std::env::var("PRIVATE_KEY") {
            Ok(pk) if !pk.trim().is_empty() => {
                validate_private_key(pk.trim())?;
                Ok(Some(pk.trim().to_string()))
            }
            _ => Ok(None),
        }
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "rpc={} chain_id={} oracle={} hermes={} tokens={:?} min_valid={}",
            self.network.rpc_url,
            self.network.chain_id,
            self.network.oracle_address,
            self.feed.hermes_url,
            self.sync.tokens,
            self.sync.min_valid_prices
        )
    }
}

fn validate_private_key(pk: &str) -> Result<()> {
    if !pk.starts_with("0x") || pk.len() != 66 {
        bail!("PRIVATE_KEY must be a hex string with 0x prefix (66 chars total)");
    }
    if !pk[2..].chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("PRIVATE_KEY contains non-hex characters");
    }
    Ok(())
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
