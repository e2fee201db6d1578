//! Core types shared by the oracle clients and the sync controller
//!
//! Tokens, feed identifiers, raw contract tuples and their normalized form.

use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes, H256, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::OracleError;

/// Tokens priced by the oracle contract, in contract enum order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Token {
    ETH = 0,
    USDC = 1,
    USDT = 2,
    PYUSD = 3,
}

/// Static per-token facts: contract index, amount decimals and Hermes feed id
#[derive(Debug, Clone, Copy)]
pub struct TokenInfo {
    pub token: Token,
    pub symbol: &'static str,
    pub index: u8,
    pub decimals: u8,
    pub feed_id: PriceFeedId,
}

/// Beta (testnet) Hermes feeds, indexed by `Token as usize`
pub const TOKEN_TABLE: [TokenInfo; 4] = [
    TokenInfo {
        token: Token::ETH,
        symbol: "ETH",
        index: 0,
        decimals: 18,
        feed_id: PriceFeedId::from_hex_const(
            "0xff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace",
        ),
    },
    TokenInfo {
        token: Token::USDC,
        symbol: "USDC",
        index: 1,
        decimals: 6,
        feed_id: PriceFeedId::from_hex_const(
            "0xeaa020c61cc479712813461ce153894a96a6c00b21ed0cfc2798d1f9a9e9c94a",
        ),
    },
    TokenInfo {
        token: Token::USDT,
        symbol: "USDT",
        index: 2,
        decimals: 6,
        feed_id: PriceFeedId::from_hex_const(
            "0x2b89b9dc8fdf9f34709a5b106b472f0f39bb6ca9ce04b0fd7f2e971688e2e53b",
        ),
    },
    TokenInfo {
        token: Token::PYUSD,
        symbol: "PYUSD",
        index: 3,
        decimals: 6,
        feed_id: PriceFeedId::from_hex_const(
            "0x6ec879b1e9963de5ee97e9c8710b742d6228252a5e2ca12d4ae81d7fe5ee8c5d",
        ),
    },
];

impl Token {
    pub const ALL: [Token; 4] = [Token::ETH, Token::USDC, Token::USDT, Token::PYUSD];

    pub fn info(&self) -> &'static TokenInfo {
        &TOKEN_TABLE[*self as usize]
    }

    /// Index passed as `uint8 token` to the oracle contract
    pub fn index(&self) -> u8 {
        self.info().index
    }

    /// Decimal places of the token's on-chain amount
    pub fn decimals(&self) -> u8 {
        self.info().decimals
    }

    pub fn feed_id(&self) -> PriceFeedId {
        self.info().feed_id
    }

    pub fn symbol(&self) -> &'static str {
        self.info().symbol
    }

    pub fn from_index(index: u8) -> Result<Self, OracleError> {
        Token::ALL
            .get(index as usize)
            .copied()
            .ok_or_else(|| OracleError::InvalidToken(format!("index {}", index)))
    }

    /// Feed ids for a token set, in the same order
    pub fn feed_ids(tokens: &[Token]) -> Vec<PriceFeedId> {
        tokens.iter().map(Token::feed_id).collect()
    }
}

impl FromStr for Token {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        TOKEN_TABLE
            .iter()
            .find(|info| info.symbol == wanted)
            .map(|info| info.token)
            .ok_or_else(|| OracleError::InvalidToken(s.to_string()))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// 32-byte Hermes price feed identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PriceFeedId(pub [u8; 32]);

const fn hex_nibble(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => panic!("invalid hex digit in feed id"),
    }
}

impl PriceFeedId {
    /// Compile-time parser for the static token table
    pub const fn from_hex_const(s: &str) -> Self {
        let bytes = s.as_bytes();
        let start = if bytes.len() > 2 && bytes[0] == b'0' && bytes[1] == b'x' {
            2
        } else {
            0
        };
        assert!(bytes.len() - start == 64, "feed id must be 32 bytes");

        let mut out = [0u8; 32];
        let mut i = 0;
        while i < 32 {
            out[i] = (hex_nibble(bytes[start + 2 * i]) << 4) | hex_nibble(bytes[start + 2 * i + 1]);
            i += 1;
        }
        Self(out)
    }

    /// Lowercase hex with `0x` prefix, the form Hermes accepts in `ids[]`
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl FromStr for PriceFeedId {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.trim().trim_start_matches("0x");
        let decoded = hex::decode(stripped)
            .map_err(|e| OracleError::Config(format!("invalid feed id '{}': {}", s, e)))?;
        let bytes: [u8; 32] = decoded
            .try_into()
            .map_err(|_| OracleError::Config(format!("feed id '{}' is not 32 bytes", s)))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for PriceFeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PriceFeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PriceFeedId({})", self.to_hex())
    }
}

/// Price tuple as cached by the oracle contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPriceTuple {
    pub mantissa: i64,
    pub confidence: u64,
    /// Power of ten applied to mantissa and confidence (usually negative)
    pub exponent: i32,
    /// Unix seconds
    pub publish_time: u64,
}

impl TryFrom<(i64, u64, i32, U256)> for RawPriceTuple {
    type Error = OracleError;

    fn try_from(
        (mantissa, confidence, exponent, publish_time): (i64, u64, i32, U256),
    ) -> Result<Self, Self::Error> {
        if publish_time > U256::from(u64::MAX) {
            return Err(OracleError::ChainCallFailed(format!(
                "publish time {} out of range",
                publish_time
            )));
        }
        Ok(Self {
            mantissa,
            confidence,
            exponent,
            publish_time: publish_time.as_u64(),
        })
    }
}

/// Largest power of ten that fits in a `U256`
const MAX_POW10: u32 = 77;

fn pow10(n: u32) -> Option<U256> {
    (n <= MAX_POW10).then(|| U256::exp10(n as usize))
}

/// Exact signed decimal `magnitude / 10^scale`.
///
/// Kept canonical (no trailing fractional zeros, zero is never negative) so
/// derived equality is numeric equality. 256 bits hold any `i64` mantissa
/// scaled by `10^±20` with room to spare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExactDecimal {
    negative: bool,
    magnitude: U256,
    scale: u32,
}

impl ExactDecimal {
    pub const ZERO: Self = Self {
        negative: false,
        magnitude: U256([0; 4]),
        scale: 0,
    };

    /// `mantissa × 10^exponent`; `None` when the result does not fit in 256 bits
    pub fn scaled(mantissa: i128, exponent: i32) -> Option<Self> {
        if exponent.unsigned_abs() > MAX_POW10 {
            return None;
        }
        let negative = mantissa < 0;
        let magnitude = U256::from(mantissa.unsigned_abs());

        let value = if exponent >= 0 {
            Self {
                negative,
                magnitude: magnitude.checked_mul(pow10(exponent as u32)?)?,
                scale: 0,
            }
        } else {
            Self {
                negative,
                magnitude,
                scale: exponent.unsigned_abs(),
            }
        };
        Some(value.normalized())
    }

    fn normalized(mut self) -> Self {
        let ten = U256::from(10u8);
        while self.scale > 0 && !self.magnitude.is_zero() && (self.magnitude % ten).is_zero() {
            self.magnitude /= ten;
            self.scale -= 1;
        }
        if self.magnitude.is_zero() {
            self.negative = false;
            self.scale = 0;
        }
        self
    }

    pub fn is_positive(&self) -> bool {
        !self.negative && !self.magnitude.is_zero()
    }

    /// Multiply by `10^exponent`
    pub fn shift(&self, exponent: i32) -> Option<Self> {
        let scale = self.scale as i64 - exponent as i64;
        if scale >= 0 {
            let scale = u32::try_from(scale).ok().filter(|s| *s <= MAX_POW10)?;
            Some(Self { scale, ..*self }.normalized())
        } else {
            let factor = u32::try_from(-scale).ok().and_then(pow10)?;
            Some(
                Self {
                    magnitude: self.magnitude.checked_mul(factor)?,
                    scale: 0,
                    ..*self
                }
                .normalized(),
            )
        }
    }

    /// The same value as a `Decimal`, when it fits in 96 bits and 28 places
    pub fn to_decimal(&self) -> Option<Decimal> {
        if self.magnitude > U256::from(i128::MAX as u128) {
            return None;
        }
        let units = self.magnitude.as_u128() as i128;
        let units = if self.negative { -units } else { units };
        Decimal::try_from_i128_with_scale(units, self.scale).ok()
    }

    /// Fixed `dp`-place rendering, rounding half to even
    pub fn round_to_string(&self, dp: u32) -> String {
        let (magnitude, scale) = if self.scale <= dp {
            (self.magnitude, self.scale)
        } else {
            let rounded = match pow10(self.scale - dp) {
                Some(divisor) => {
                    let (mut quotient, remainder) = self.magnitude.div_mod(divisor);
                    let rest = divisor - remainder;
                    if remainder > rest || (remainder == rest && quotient.bit(0)) {
                        quotient += U256::one();
                    }
                    quotient
                }
                // below the last kept digit
                None => U256::zero(),
            };
            (rounded, dp)
        };

        let mut body = render_digits(magnitude, scale);
        if dp > scale {
            if scale == 0 {
                body.push('.');
            }
            body.push_str(&"0".repeat((dp - scale) as usize));
        }
        if self.negative && !magnitude.is_zero() {
            format!("-{}", body)
        } else {
            body
        }
    }

    fn parse(s: &str) -> Option<Self> {
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (int, frac) = body.split_once('.').unwrap_or((body, ""));
        if int.is_empty() || !int.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }
        let scale = u32::try_from(frac.len()).ok().filter(|s| *s <= MAX_POW10)?;
        let magnitude = U256::from_dec_str(&format!("{}{}", int, frac)).ok()?;
        Some(
            Self {
                negative,
                magnitude,
                scale,
            }
            .normalized(),
        )
    }
}

/// Digits of `magnitude` with a decimal point `scale` places from the right
fn render_digits(magnitude: U256, scale: u32) -> String {
    let digits = magnitude.to_string();
    let scale = scale as usize;
    if scale == 0 {
        return digits;
    }
    if digits.len() > scale {
        let (int, frac) = digits.split_at(digits.len() - scale);
        format!("{}.{}", int, frac)
    } else {
        format!("0.{:0>width$}", digits, width = scale)
    }
}

impl Default for ExactDecimal {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for ExactDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        write!(f, "{}", render_digits(self.magnitude, self.scale))
    }
}

impl Serialize for ExactDecimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ExactDecimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid decimal '{}'", s)))
    }
}

/// Validated, display-ready price derived from a [`RawPriceTuple`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPrice {
    pub actual_price: ExactDecimal,
    pub confidence_interval: ExactDecimal,
    pub publish_time_utc: Option<DateTime<Utc>>,
    pub age_seconds: Option<u64>,
    pub is_valid: bool,
    pub formatted: String,
    pub error: Option<String>,
}

pub const PRICE_NOT_AVAILABLE: &str = "Price not available";
pub const NOT_AVAILABLE: &str = "N/A";

impl NormalizedPrice {
    /// The all-"N/A" result used when a tuple could not be read or scaled
    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            actual_price: ExactDecimal::ZERO,
            confidence_interval: ExactDecimal::ZERO,
            publish_time_utc: None,
            age_seconds: None,
            is_valid: false,
            formatted: PRICE_NOT_AVAILABLE.to_string(),
            error: Some(error.into()),
        }
    }

    /// "12m ago" below one day, "3d ago" beyond
    pub fn age_display(&self) -> String {
        match self.age_seconds {
            Some(age) => {
                let minutes = age / 60;
                if minutes < 1440 {
                    format!("{}m ago", minutes)
                } else {
                    format!("{}d ago", minutes / 1440)
                }
            }
            None => NOT_AVAILABLE.to_string(),
        }
    }

    pub fn publish_date_display(&self) -> String {
        self.publish_time_utc
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }

    pub fn confidence_display(&self) -> String {
        if self.is_valid && self.confidence_interval.is_positive() {
            format!("±{}", self.confidence_interval.round_to_string(6))
        } else {
            NOT_AVAILABLE.to_string()
        }
    }
}

/// Signed Hermes attestations in request order, consumed verbatim by `updatePriceFeeds`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceUpdatePayload(Vec<Bytes>);

impl PriceUpdatePayload {
    pub fn new(blobs: Vec<Bytes>) -> Self {
        Self(blobs)
    }

    pub fn blobs(&self) -> &[Bytes] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Owned `bytes[]` argument for the contract bindings
    pub fn to_call_data(&self) -> Vec<Bytes> {
        self.0.clone()
    }
}

/// Output of `getContractInfo()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractInfo {
    pub contract_address: Address,
    pub aggregator_address: Address,
    pub owner_address: Address,
    pub contract_balance: U256,
}

impl ContractInfo {
    pub fn balance_display(&self) -> String {
        format!("{} ETH", ethers::utils::format_ether(self.contract_balance))
    }
}

/// Confirmed `updatePriceFeeds` transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReceipt {
    pub tx_hash: H256,
    pub block_number: Option<u64>,
    pub nonce: u64,
    pub fee: U256,
    pub gas_used: Option<U256>,
}
