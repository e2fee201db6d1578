//! Fixed-point price normalization
//!
//! Converts the contract's `(price, conf, expo, publishTime)` tuple into an
//! exact 256-bit decimal, so any `i64` mantissa keeps every digit across the
//! whole exponent range. Never fails: anything that cannot be scaled degrades
//! to [`NormalizedPrice::unavailable`].

use chrono::{DateTime, TimeZone, Utc};

use crate::types::{ExactDecimal, NormalizedPrice, RawPriceTuple, PRICE_NOT_AVAILABLE};

/// Publish times at or below this are treated as missing
pub const PUBLISH_TIME_FLOOR: u64 = 1_000_000_000;
/// How far ahead of local time a publish time may be before it is ignored
pub const MAX_CLOCK_SKEW_SECS: u64 = 86_400;

/// Normalize against the current wall clock
pub fn format_price(raw: &RawPriceTuple) -> NormalizedPrice {
    format_price_at(raw, Utc::now())
}

/// Normalize against an explicit `now`
pub fn format_price_at(raw: &RawPriceTuple, now: DateTime<Utc>) -> NormalizedPrice {
    let Some(actual_price) = ExactDecimal::scaled(raw.mantissa as i128, raw.exponent) else {
        tracing::warn!(
            mantissa = raw.mantissa,
            exponent = raw.exponent,
            "Price outside representable range"
        );
        return NormalizedPrice::unavailable(format!(
            "price {}e{} outside representable range",
            raw.mantissa, raw.exponent
        ));
    };
    let Some(confidence_interval) = ExactDecimal::scaled(raw.confidence as i128, raw.exponent) else {
        return NormalizedPrice::unavailable(format!(
            "confidence {}e{} outside representable range",
            raw.confidence, raw.exponent
        ));
    };

    let now_secs = now.timestamp().max(0) as u64;
    let (publish_time_utc, age_seconds) = if raw.publish_time > PUBLISH_TIME_FLOOR
        && raw.publish_time < now_secs.saturating_add(MAX_CLOCK_SKEW_SECS)
    {
        let published = Utc.timestamp_opt(raw.publish_time as i64, 0).single();
        // a publish time ahead of the local clock has no meaningful age
        let age = now_secs.checked_sub(raw.publish_time);
        (published, published.and(age))
    } else {
        (None, None)
    };

    let is_valid = actual_price.is_positive() && raw.mantissa != 0;
    let formatted = if is_valid {
        format!("${}", actual_price.round_to_string(6))
    } else {
        PRICE_NOT_AVAILABLE.to_string()
    };

    NormalizedPrice {
        actual_price,
        confidence_interval,
        publish_time_utc,
        age_seconds,
        is_valid,
        formatted,
        error: None,
    }
}
