//! PriceSync CLI
//!
//! Usage: cargo run --bin pricesync
//!
//! Reads cached prices from the oracle and refreshes them from Hermes when a
//! PRIVATE_KEY is configured and the cache is insufficient.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pricesync::config::AppConfig;
use pricesync::display::{render_contract_info, render_readable_prices, render_report};
use pricesync::feed::{FeedSource, HermesClient};
use pricesync::oracle::{OracleReadClient, OracleWriteClient, OracleWriter};
use pricesync::sync::{PriceSyncController, SyncPolicy};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("PRICESYNC_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing();

    info!("🚀 PriceSync starting");
    info!("Config: {}", config.digest());

    let private_key = config.signing_key()?;
    let tokens = config.sync.tokens()?;

    let reader = Arc::new(
        OracleReadClient::connect(&config.network, &config.sync)
            .await
            .context("oracle connectivity check failed")?,
    );

    let writer: Option<Arc<dyn OracleWriter>> = match private_key.as_deref() {
        Some(key) => {
            let client = OracleWriteClient::from_config(&config.network, &config.sync, Some(key))
                .await
                .context("failed to initialize signer")?;
            info!(
                signer = %format!("{:#x}", client.signer_address()),
                next_nonce = client.next_nonce(),
                "✍️ Write mode enabled"
            );
            Some(Arc::new(client) as Arc<dyn OracleWriter>)
        }
        None => {
            info!("ℹ️ No PRIVATE_KEY set, running in read-only mode");
            None
        }
    };

    let feed: Arc<dyn FeedSource> = Arc::new(HermesClient::new(&config.feed)?);
    let controller = PriceSyncController::new(
        reader.clone(),
        feed,
        writer,
        tokens,
        SyncPolicy::from(&config.sync),
    );

    match controller.contract_info().await {
        Ok(contract) => println!("{}", render_contract_info(&contract)),
        Err(e) => warn!(error = %e, "Could not read contract info"),
    }

    let report = tokio::select! {
        result = controller.sync() => result.context("price sync failed")?,
        _ = tokio::signal::ctrl_c() => {
            warn!("🛑 Interrupted, aborting sync");
            return Ok(());
        }
    };
    println!("{}", render_report(&report));

    let mut readable = Vec::new();
    for token in report.prices.iter().filter(|(_, p)| p.is_valid).map(|(t, _)| *t) {
        readable.push((token, reader.get_readable_price(token).await));
    }
    if !readable.is_empty() {
        println!("{}", render_readable_prices(&readable));
    }

    if config.sync.stale_after_secs > 0 {
        let stale = controller.stale_tokens(config.sync.stale_after_secs).await;
        if stale.is_empty() {
            info!(max_age_secs = config.sync.stale_after_secs, "✅ No stale prices");
        } else {
            let symbols: Vec<&str> = stale.iter().map(|t| t.symbol()).collect();
            warn!(
                max_age_secs = config.sync.stale_after_secs,
                "⚠️ Stale prices: {}",
                symbols.join(", ")
            );
        }
    }

    Ok(())
}
