//! Oracle contract access
//!
//! Reads of the on-chain price cache, price-update submission and
//! normalization of the contract's fixed-point prices.

mod formatter;
mod nonce;
mod reader;
mod writer;

pub use formatter::{format_price, format_price_at, MAX_CLOCK_SKEW_SECS, PUBLISH_TIME_FLOOR};
pub use nonce::{is_sequence_conflict, NonceTracker};
pub use reader::{CachedPrices, OracleReadClient, OracleReader};
pub use writer::{EthersTransport, OracleWriteClient, OracleWriter, UpdateTransport, UpdateTx};

use ethers::contract::abigen;

abigen!(
    PriceOracleContract,
    r#"[
        function getLatestPrice(uint8 token) external view returns (int64 price, uint64 confidence, int32 expo, uint256 publishTime)
        function getLatestPriceWithUpdate(uint8 token, bytes[] priceUpdateData) external payable returns (int64 price, uint64 confidence, int32 expo, uint256 publishTime)
        function getUpdateFee(bytes[] priceUpdateData) external view returns (uint256)
        function updatePriceFeeds(bytes[] priceUpdateData) external payable
        function getContractInfo() external view returns (address pythAddress, address contractOwner, uint256 contractBalance)
        function isPriceStale(uint8 token, uint256 maxAgeSeconds) external view returns (bool)
        function getReadablePrice(uint8 token) external view returns (uint256 price, uint8 decimals)
    ]"#
);
