//! PriceSync Library
//!
//! Reads and refreshes Pyth-backed token prices on an on-chain oracle

pub mod config;
pub mod display;
pub mod error;
pub mod feed;
pub mod oracle;
pub mod sync;
pub mod types;

pub use error::{OracleError, OracleResult};
