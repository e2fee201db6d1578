//! Error taxonomy for the oracle client
//!
//! Per-token read failures are folded into invalid prices by the sync
//! controller; everything else surfaces as one of these variants.

use thiserror::Error;

pub type OracleResult<T> = std::result::Result<T, OracleError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    /// Hermes request failed or returned an unusable envelope
    #[error("price feed unavailable: {0}")]
    FeedUnavailable(String),

    /// A contract read or RPC query failed
    #[error("chain call failed: {0}")]
    ChainCallFailed(String),

    /// A write was attempted without PRIVATE_KEY
    #[error("no signing identity configured")]
    NoSigningIdentity,

    /// The chain rejected the nonce; the counter has already been resynced
    #[error("transaction sequence conflict at nonce {nonce}: {reason}")]
    SequenceConflict { nonce: u64, reason: String },

    /// Submission failed for a reason other than sequencing
    #[error("price update rejected: {0}")]
    UpdateRejected(String),

    #[error("unsupported token: {0}")]
    InvalidToken(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl OracleError {
    /// Whether a caller may retry the same operation and expect a different outcome
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OracleError::SequenceConflict { .. }
                | OracleError::FeedUnavailable(_)
                | OracleError::ChainCallFailed(_)
        )
    }
}
