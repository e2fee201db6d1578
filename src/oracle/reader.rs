//! Read-only oracle queries
//!
//! Every call is an independent `eth_call`; nothing here retries. Callers
//! decide whether a failed read means "no cached price" or a hard error.

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, U256};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::PriceOracleContract;
use crate::config::{NetworkConfig, SyncConfig};
use crate::error::{OracleError, OracleResult};
use crate::types::{ContractInfo, RawPriceTuple, Token};

/// Per-token read results; one token failing never hides the others
pub type CachedPrices = BTreeMap<Token, OracleResult<RawPriceTuple>>;

/// Read surface of the oracle contract
#[async_trait]
pub trait OracleReader: Send + Sync {
    /// Cached price for one token (`getLatestPrice`)
    async fn get_cached_price(&self, token: Token) -> OracleResult<RawPriceTuple>;

    /// Cached prices for a token set. An `Err` here means the whole lookup
    /// failed; individual token failures are kept inside the map.
    async fn get_all_cached_prices(&self, tokens: &[Token]) -> OracleResult<CachedPrices>;

    /// `isPriceStale(token, maxAgeSeconds)`
    async fn is_stale(&self, token: Token, max_age_secs: u64) -> OracleResult<bool>;

    async fn get_contract_info(&self) -> OracleResult<ContractInfo>;
}

type HttpProvider = Provider<Http>;

/// ethers-backed reader for the deployed oracle
pub struct OracleReadClient {
    provider: Arc<HttpProvider>,
    contract: PriceOracleContract<HttpProvider>,
    address: Address,
    throttle: Duration,
    parallel: bool,
}

/// JSON-RPC provider with a bounded per-request timeout
pub(crate) fn http_provider(network: &NetworkConfig) -> OracleResult<HttpProvider> {
    let url = reqwest::Url::parse(&network.rpc_url).map_err(|e| {
        OracleError::Config(format!("invalid rpc_url '{}': {}", network.rpc_url, e))
    })?;
    let client = reqwest::Client::builder()
        .timeout(network.rpc_timeout())
        .build()
        .map_err(|e| OracleError::Config(format!("failed to build RPC client: {}", e)))?;
    Ok(Provider::new(Http::new_with_client(url, client)))
}

impl OracleReadClient {
    pub fn new(network: &NetworkConfig, sync: &SyncConfig) -> OracleResult<Self> {
        let address = network.oracle_address()?;
        let provider = Arc::new(http_provider(network)?);
        let contract = PriceOracleContract::new(address, provider.clone());

        Ok(Self {
            provider,
            contract,
            address,
            throttle: sync.read_throttle(),
            parallel: sync.parallel_reads,
        })
    }

    /// Build the client and verify the node answers and the contract exists
    pub async fn connect(network: &NetworkConfig, sync: &SyncConfig) -> OracleResult<Self> {
        let client = Self::new(network, sync)?;
        let chain_id = client.verify_deployment().await?;

        if chain_id != network.chain_id {
            tracing::warn!(
                expected = network.chain_id,
                actual = chain_id,
                "RPC endpoint reports a different chain id than configured"
            );
        }
        tracing::info!(
            rpc = %network.rpc_url,
            chain_id = chain_id,
            oracle = %format!("{:#x}", client.address),
            "✅ Connected to oracle"
        );

        Ok(client)
    }

    /// Chain id of the endpoint, failing when no code is deployed at the oracle address
    pub async fn verify_deployment(&self) -> OracleResult<u64> {
        let chain_id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| OracleError::ChainCallFailed(format!("eth_chainId: {}", e)))?;

        let code = self
            .provider
            .get_code(self.address, None)
            .await
            .map_err(|e| OracleError::ChainCallFailed(format!("eth_getCode: {}", e)))?;
        if code.0.is_empty() {
            return Err(OracleError::ChainCallFailed(format!(
                "no contract deployed at {:#x}",
                self.address
            )));
        }

        Ok(chain_id.low_u64())
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// `getReadablePrice(token)` scaled by the contract-reported decimals
    pub async fn get_readable_price(&self, token: Token) -> OracleResult<Decimal> {
        let (price, decimals) = self
            .contract
            .get_readable_price(token.index())
            .call()
            .await
            .map_err(|e| {
                OracleError::ChainCallFailed(format!("getReadablePrice({}): {}", token, e))
            })?;
        readable_to_decimal(price, decimals)
    }
}

/// One read per token, either back to back with `throttle` between calls or
/// all at once. A failing token only affects its own entry.
async fn read_each<F, Fut>(
    tokens: &[Token],
    parallel: bool,
    throttle: Duration,
    read: F,
) -> CachedPrices
where
    F: Fn(Token) -> Fut,
    Fut: Future<Output = OracleResult<RawPriceTuple>>,
{
    if parallel {
        let reads = tokens.iter().map(|token| {
            let token = *token;
            let pending = read(token);
            async move { (token, pending.await) }
        });
        return join_all(reads).await.into_iter().collect();
    }

    let mut prices = BTreeMap::new();
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 && !throttle.is_zero() {
            tokio::time::sleep(throttle).await;
        }
        prices.insert(*token, read(*token).await);
    }
    prices
}

fn readable_to_decimal(price: U256, decimals: u8) -> OracleResult<Decimal> {
    if price > U256::from(i128::MAX as u128) {
        return Err(OracleError::ChainCallFailed(format!(
            "readable price {} out of range",
            price
        )));
    }
    Decimal::try_from_i128_with_scale(price.as_u128() as i128, decimals as u32).map_err(|e| {
        OracleError::ChainCallFailed(format!(
            "readable price {} with {} decimals: {}",
            price, decimals, e
        ))
    })
}

#[async_trait]
impl OracleReader for OracleReadClient {
    async fn get_cached_price(&self, token: Token) -> OracleResult<RawPriceTuple> {
        let tuple = self
            .contract
            .get_latest_price(token.index())
            .call()
            .await
            .map_err(|e| OracleError::ChainCallFailed(format!("getLatestPrice({}): {}", token, e)))?;

        tracing::debug!(token = %token, price = tuple.0, expo = tuple.2, "Read cached price");
        RawPriceTuple::try_from(tuple)
    }

    async fn get_all_cached_prices(&self, tokens: &[Token]) -> OracleResult<CachedPrices> {
        let prices = read_each(tokens, self.parallel, self.throttle, |token| {
            self.get_cached_price(token)
        })
        .await;

        for (token, result) in &prices {
            if let Err(e) = result {
                tracing::warn!(token = %token, error = %e, "Cached price read failed");
            }
        }
        Ok(prices)
    }

    async fn is_stale(&self, token: Token, max_age_secs: u64) -> OracleResult<bool> {
        self.contract
            .is_price_stale(token.index(), U256::from(max_age_secs))
            .call()
            .await
            .map_err(|e| OracleError::ChainCallFailed(format!("isPriceStale({}): {}", token, e)))
    }

    async fn get_contract_info(&self) -> OracleResult<ContractInfo> {
        let (aggregator_address, owner_address, contract_balance) = self
            .contract
            .get_contract_info()
            .call()
            .await
            .map_err(|e| OracleError::ChainCallFailed(format!("getContractInfo(): {}", e)))?;

        Ok(ContractInfo {
            contract_address: self.address,
            aggregator_address,
            owner_address,
            contract_balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[test]
    fn readable_price_uses_contract_decimals() {
        let price = readable_to_decimal(U256::from(345_612_000_000u64), 8).unwrap();
        assert_eq!(price, dec!(3456.12));
        assert!(readable_to_decimal(U256::MAX, 8).is_err());
    }

    fn tuple(mantissa: i64) -> RawPriceTuple {
        RawPriceTuple {
            mantissa,
            confidence: 1_000,
            exponent: -8,
            publish_time: 1_750_000_000,
        }
    }

    async fn read_stub(token: Token) -> OracleResult<RawPriceTuple> {
        match token {
            Token::USDC => Err(OracleError::ChainCallFailed("execution reverted".to_string())),
            other => Ok(tuple(other.index() as i64 + 1)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_reads_are_throttled_and_isolated() {
        let calls = Mutex::new(Vec::new());
        let prices = read_each(&Token::ALL, false, Duration::from_millis(100), |token| {
            calls.lock().unwrap().push((token, Instant::now()));
            read_stub(token)
        })
        .await;

        let calls = calls.into_inner().unwrap();
        let order: Vec<Token> = calls.iter().map(|(t, _)| *t).collect();
        assert_eq!(order, Token::ALL.to_vec());
        for pair in calls.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(100));
        }

        assert_eq!(prices.len(), 4);
        assert!(matches!(prices[&Token::USDC], Err(OracleError::ChainCallFailed(_))));
        assert_eq!(prices[&Token::ETH], Ok(tuple(1)));
        assert_eq!(prices[&Token::PYUSD], Ok(tuple(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_reads_skip_throttle_and_isolate_failures() {
        let started = Instant::now();
        let prices = read_each(&Token::ALL, true, Duration::from_millis(100), read_stub).await;

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(prices.len(), 4);
        assert!(prices[&Token::USDC].is_err());
        assert_eq!(prices[&Token::USDT], Ok(tuple(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_throttle_reads_back_to_back() {
        let started = Instant::now();
        let prices = read_each(&[Token::ETH, Token::USDT], false, Duration::ZERO, read_stub).await;
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(prices.values().all(|p| p.is_ok()));
    }

    #[test]
    fn new_rejects_bad_rpc_url() {
        let mut config = AppConfig::defaults().unwrap();
        config.network.rpc_url = "not a url".to_string();
        assert!(matches!(
            OracleReadClient::new(&config.network, &config.sync),
            Err(OracleError::Config(_))
        ));
    }

    #[test]
    fn new_uses_configured_oracle_address() {
        let config = AppConfig::defaults().unwrap();
        let client = OracleReadClient::new(&config.network, &config.sync).unwrap();
        assert_eq!(client.address(), config.network.oracle_address().unwrap());
    }
}
