//! Price-update submission
//!
//! One attempt = fee query → `updatePriceFeeds` with the fee attached →
//! one confirmation. The nonce is taken from [`NonceTracker`] before the send
//! resolves, so a second submission issued while the first is pending never
//! reuses it. A sequencing conflict resyncs the tracker from the chain and
//! surfaces as [`OracleError::SequenceConflict`]; the caller decides whether
//! to retry.

use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, BlockId, BlockNumber, U256, U64};
use ethers::utils::format_ether;
use std::sync::Arc;

use super::nonce::{is_sequence_conflict, NonceTracker};
use super::reader::http_provider;
use super::PriceOracleContract;
use crate::config::{NetworkConfig, SyncConfig};
use crate::error::{OracleError, OracleResult};
use crate::types::{PriceUpdatePayload, UpdateReceipt};

/// Submits signed price updates to the oracle
#[async_trait]
pub trait OracleWriter: Send + Sync {
    async fn submit_update(&self, payload: &PriceUpdatePayload) -> OracleResult<UpdateReceipt>;
}

/// Transaction parameters for one `updatePriceFeeds` attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateTx {
    pub fee: U256,
    pub gas_limit: u64,
    pub nonce: u64,
}

/// Chain access needed by [`OracleWriteClient`]
#[async_trait]
pub trait UpdateTransport: Send + Sync {
    fn signer_address(&self) -> Address;

    /// Authoritative next nonce for the signer (pending block)
    async fn transaction_count(&self) -> OracleResult<u64>;

    async fn balance(&self) -> OracleResult<U256>;

    /// `getUpdateFee(payload)`
    async fn update_fee(&self, payload: &PriceUpdatePayload) -> OracleResult<U256>;

    /// Send `updatePriceFeeds(payload)` and wait for one confirmation
    async fn send_update(
        &self,
        payload: &PriceUpdatePayload,
        tx: UpdateTx,
    ) -> OracleResult<UpdateReceipt>;
}

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// [`UpdateTransport`] over an ethers signer middleware
pub struct EthersTransport {
    client: Arc<SignerClient>,
    contract: PriceOracleContract<SignerClient>,
}

impl EthersTransport {
    pub fn new(network: &NetworkConfig, private_key: &str) -> OracleResult<Self> {
        let wallet: LocalWallet = private_key
            .parse()
            .map_err(|e| OracleError::Config(format!("invalid PRIVATE_KEY: {}", e)))?;
        let signer = wallet.with_chain_id(network.chain_id);
        let client = Arc::new(SignerMiddleware::new(http_provider(network)?, signer));
        let contract = PriceOracleContract::new(network.oracle_address()?, client.clone());

        Ok(Self { client, contract })
    }
}

#[async_trait]
impl UpdateTransport for EthersTransport {
    fn signer_address(&self) -> Address {
        self.client.address()
    }

    async fn transaction_count(&self) -> OracleResult<u64> {
        let count = self
            .client
            .get_transaction_count(
                self.client.address(),
                Some(BlockId::Number(BlockNumber::Pending)),
            )
            .await
            .map_err(|e| OracleError::ChainCallFailed(format!("eth_getTransactionCount: {}", e)))?;
        Ok(count.low_u64())
    }

    async fn balance(&self) -> OracleResult<U256> {
        self.client
            .get_balance(self.client.address(), None)
            .await
            .map_err(|e| OracleError::ChainCallFailed(format!("eth_getBalance: {}", e)))
    }

    async fn update_fee(&self, payload: &PriceUpdatePayload) -> OracleResult<U256> {
        self.contract
            .get_update_fee(payload.to_call_data())
            .call()
            .await
            .map_err(|e| OracleError::ChainCallFailed(format!("getUpdateFee(): {}", e)))
    }

    async fn send_update(
        &self,
        payload: &PriceUpdatePayload,
        tx: UpdateTx,
    ) -> OracleResult<UpdateReceipt> {
        let call = self
            .contract
            .update_price_feeds(payload.to_call_data())
            .value(tx.fee)
            .gas(tx.gas_limit)
            .nonce(tx.nonce);

        let pending = call
            .send()
            .await
            .map_err(|e| OracleError::UpdateRejected(e.to_string()))?;
        let tx_hash = pending.tx_hash();
        tracing::info!(
            tx_hash = %format!("{:#x}", tx_hash),
            nonce = tx.nonce,
            "🚀 Price update transaction sent"
        );

        let receipt = pending
            .confirmations(1)
            .await
            .map_err(|e| {
                OracleError::UpdateRejected(format!(
                    "{:#x} failed while awaiting confirmation: {}",
                    tx_hash, e
                ))
            })?
            .ok_or_else(|| {
                OracleError::UpdateRejected(format!(
                    "{:#x} dropped before confirmation",
                    tx_hash
                ))
            })?;

        if receipt.status == Some(U64::zero()) {
            return Err(OracleError::UpdateRejected(format!(
                "{:#x} reverted in block {:?}",
                tx_hash, receipt.block_number
            )));
        }

        Ok(UpdateReceipt {
            tx_hash,
            block_number: receipt.block_number.map(|b| b.as_u64()),
            nonce: tx.nonce,
            fee: tx.fee,
            gas_used: receipt.gas_used,
        })
    }
}

/// Owns the signer's nonce counter and runs the update protocol
pub struct OracleWriteClient<T> {
    transport: T,
    nonce: NonceTracker,
    gas_limit: u64,
    rollback_on_failure: bool,
}

impl OracleWriteClient<EthersTransport> {
    /// Write client for the configured signer; `None` key is `NoSigningIdentity`
    pub async fn from_config(
        network: &NetworkConfig,
        sync: &SyncConfig,
        private_key: Option<&str>,
    ) -> OracleResult<Self> {
        let private_key = private_key.ok_or(OracleError::NoSigningIdentity)?;
        let transport = EthersTransport::new(network, private_key)?;
        Self::connect(transport, sync.gas_limit, sync.rollback_nonce_on_failure).await
    }
}

impl<T: UpdateTransport> OracleWriteClient<T> {
    /// Seed the nonce counter from the chain
    pub async fn connect(transport: T, gas_limit: u64, rollback_on_failure: bool) -> OracleResult<Self> {
        let start = transport.transaction_count().await?;
        let signer = transport.signer_address();

        match transport.balance().await {
            Ok(balance) => tracing::info!(
                signer = %format!("{:#x}", signer),
                nonce = start,
                balance_eth = %format_ether(balance),
                "🔑 Signer loaded"
            ),
            Err(e) => tracing::warn!(
                signer = %format!("{:#x}", signer),
                nonce = start,
                error = %e,
                "🔑 Signer loaded, balance unavailable"
            ),
        }

        Ok(Self {
            transport,
            nonce: NonceTracker::new(start),
            gas_limit,
            rollback_on_failure,
        })
    }

    /// Nonce the next submission will use
    pub fn next_nonce(&self) -> u64 {
        self.nonce.current()
    }

    pub fn signer_address(&self) -> Address {
        self.transport.signer_address()
    }

    async fn resync_nonce(&self) {
        match self.transport.transaction_count().await {
            Ok(count) => {
                tracing::info!(nonce = count, "🔄 Nonce reset from chain");
                self.nonce.reset(count);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to reread nonce after conflict");
            }
        }
    }
}

fn failure_reason(err: OracleError) -> String {
    match err {
        OracleError::UpdateRejected(reason) | OracleError::ChainCallFailed(reason) => reason,
        other => other.to_string(),
    }
}

#[async_trait]
impl<T: UpdateTransport> OracleWriter for OracleWriteClient<T> {
    async fn submit_update(&self, payload: &PriceUpdatePayload) -> OracleResult<UpdateReceipt> {
        if payload.is_empty() {
            return Err(OracleError::UpdateRejected(
                "empty price update payload".to_string(),
            ));
        }

        let fee = self.transport.update_fee(payload).await.map_err(|e| {
            OracleError::UpdateRejected(format!("fee query failed: {}", failure_reason(e)))
        })?;

        let nonce = self.nonce.take();
        tracing::info!(
            nonce = nonce,
            fee_eth = %format_ether(fee),
            updates = payload.len(),
            "📊 Submitting price update"
        );

        let tx = UpdateTx {
            fee,
            gas_limit: self.gas_limit,
            nonce,
        };
        match self.transport.send_update(payload, tx).await {
            Ok(receipt) => {
                tracing::info!(
                    tx_hash = %format!("{:#x}", receipt.tx_hash),
                    block = ?receipt.block_number,
                    nonce = nonce,
                    "✅ Prices updated"
                );
                Ok(receipt)
            }
            Err(e) => {
                let reason = failure_reason(e);
                if is_sequence_conflict(&reason) {
                    tracing::warn!(nonce = nonce, reason = %reason, "Nonce conflict on price update");
                    self.resync_nonce().await;
                    return Err(OracleError::SequenceConflict { nonce, reason });
                }

                tracing::error!(nonce = nonce, reason = %reason, "❌ Price update failed");
                if self.rollback_on_failure && self.nonce.release(nonce) {
                    tracing::debug!(nonce = nonce, "Released unused nonce");
                }
                Err(OracleError::UpdateRejected(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Bytes, H256};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted chain: pops one send outcome per submission and records nonces
    struct ScriptedTransport {
        chain_count: Mutex<u64>,
        fee: U256,
        outcomes: Mutex<VecDeque<Result<(), String>>>,
        sent: Mutex<Vec<UpdateTx>>,
    }

    impl ScriptedTransport {
        fn new(chain_count: u64, outcomes: Vec<Result<(), String>>) -> Self {
            Self {
                chain_count: Mutex::new(chain_count),
                fee: U256::from(1_000u64),
                outcomes: Mutex::new(outcomes.into()),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent_nonces(&self) -> Vec<u64> {
            self.sent.lock().unwrap().iter().map(|tx| tx.nonce).collect()
        }
    }

    #[async_trait]
    impl UpdateTransport for ScriptedTransport {
        fn signer_address(&self) -> Address {
            Address::repeat_byte(0x11)
        }

        async fn transaction_count(&self) -> OracleResult<u64> {
            Ok(*self.chain_count.lock().unwrap())
        }

        async fn balance(&self) -> OracleResult<U256> {
            Ok(U256::exp10(18))
        }

        async fn update_fee(&self, _payload: &PriceUpdatePayload) -> OracleResult<U256> {
            Ok(self.fee)
        }

        async fn send_update(
            &self,
            _payload: &PriceUpdatePayload,
            tx: UpdateTx,
        ) -> OracleResult<UpdateReceipt> {
            self.sent.lock().unwrap().push(tx);
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(()));
            match outcome {
                Ok(()) => {
                    *self.chain_count.lock().unwrap() = tx.nonce + 1;
                    Ok(UpdateReceipt {
                        tx_hash: H256::repeat_byte(tx.nonce as u8),
                        block_number: Some(100 + tx.nonce),
                        nonce: tx.nonce,
                        fee: tx.fee,
                        gas_used: Some(U256::from(90_000u64)),
                    })
                }
                Err(reason) => Err(OracleError::UpdateRejected(reason)),
            }
        }
    }

    fn payload() -> PriceUpdatePayload {
        PriceUpdatePayload::new(vec![Bytes::from(vec![0x50, 0x4e, 0x41, 0x55])])
    }

    #[tokio::test]
    async fn submits_with_fee_gas_and_chain_nonce() {
        let client = OracleWriteClient::connect(ScriptedTransport::new(7, vec![]), 1_000_000, false)
            .await
            .unwrap();

        let receipt = client.submit_update(&payload()).await.unwrap();
        assert_eq!(receipt.nonce, 7);
        assert_eq!(receipt.block_number, Some(107));
        assert_eq!(client.next_nonce(), 8);

        let sent = client.transport.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![UpdateTx {
                fee: U256::from(1_000u64),
                gas_limit: 1_000_000,
                nonce: 7
            }]
        );
    }

    #[tokio::test]
    async fn back_to_back_submissions_use_distinct_nonces() {
        let client = OracleWriteClient::connect(ScriptedTransport::new(3, vec![]), 1_000_000, false)
            .await
            .unwrap();
        client.submit_update(&payload()).await.unwrap();
        client.submit_update(&payload()).await.unwrap();
        assert_eq!(client.transport.sent_nonces(), vec![3, 4]);
    }

    #[tokio::test]
    async fn conflict_resyncs_counter_for_next_call() {
        let transport = ScriptedTransport::new(5, vec![Err("nonce too low".to_string())]);
        let client = OracleWriteClient::connect(transport, 1_000_000, false)
            .await
            .unwrap();

        // another process used nonces 5 and 6 meanwhile
        *client.transport.chain_count.lock().unwrap() = 7;

        let err = client.submit_update(&payload()).await.unwrap_err();
        assert_eq!(
            err,
            OracleError::SequenceConflict {
                nonce: 5,
                reason: "nonce too low".to_string()
            }
        );
        assert_eq!(client.next_nonce(), 7);

        let receipt = client.submit_update(&payload()).await.unwrap();
        assert_eq!(receipt.nonce, 7);
        assert_eq!(client.transport.sent_nonces(), vec![5, 7]);
    }

    #[tokio::test]
    async fn other_failures_keep_optimistic_increment() {
        let transport = ScriptedTransport::new(
            2,
            vec![Err("insufficient funds for gas * price + value".to_string())],
        );
        let client = OracleWriteClient::connect(transport, 1_000_000, false)
            .await
            .unwrap();

        let err = client.submit_update(&payload()).await.unwrap_err();
        assert!(matches!(err, OracleError::UpdateRejected(_)));
        assert_eq!(client.next_nonce(), 3);
    }

    #[tokio::test]
    async fn rollback_returns_nonce_on_rejection() {
        let transport = ScriptedTransport::new(2, vec![Err("execution reverted".to_string())]);
        let client = OracleWriteClient::connect(transport, 1_000_000, true)
            .await
            .unwrap();

        assert!(client.submit_update(&payload()).await.is_err());
        assert_eq!(client.next_nonce(), 2);
        client.submit_update(&payload()).await.unwrap();
        assert_eq!(client.transport.sent_nonces(), vec![2, 2]);
    }

    #[tokio::test]
    async fn empty_payload_is_rejected_without_sending() {
        let client = OracleWriteClient::connect(ScriptedTransport::new(0, vec![]), 1_000_000, false)
            .await
            .unwrap();
        let err = client
            .submit_update(&PriceUpdatePayload::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::UpdateRejected(_)));
        assert!(client.transport.sent_nonces().is_empty());
        assert_eq!(client.next_nonce(), 0);
    }

    #[tokio::test]
    async fn missing_key_is_no_signing_identity() {
        let config = crate::config::AppConfig::defaults().unwrap();
        let result = OracleWriteClient::from_config(&config.network, &config.sync, None).await;
        assert!(matches!(result, Err(OracleError::NoSigningIdentity)));
    }
}
