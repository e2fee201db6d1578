//! Console rendering for sync results

use rust_decimal::Decimal;

use crate::error::OracleResult;
use crate::sync::{RefreshOutcome, SyncReport};
use crate::types::{ContractInfo, Token, NOT_AVAILABLE, PRICE_NOT_AVAILABLE};

const RULE_WIDTH: usize = 85;

fn row(token: &str, price: &str, confidence: &str, updated: &str) -> String {
    format!("{:<8} | {:<17} | {:<16} | {}", token, price, confidence, updated)
}

/// Token | Price | Confidence | Last Updated table plus a status summary
pub fn render_report(report: &SyncReport) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut lines = vec![
        rule.clone(),
        "📊 TOKEN PRICES".to_string(),
        rule.clone(),
        row("Token", "Price (USD)", "Confidence", "Last Updated"),
        "-".repeat(RULE_WIDTH),
    ];

    for (token, price) in &report.prices {
        if price.is_valid {
            lines.push(row(
                token.symbol(),
                &price.formatted,
                &price.confidence_display(),
                &price.age_display(),
            ));
        } else {
            lines.push(row(
                token.symbol(),
                PRICE_NOT_AVAILABLE,
                NOT_AVAILABLE,
                NOT_AVAILABLE,
            ));
        }
    }

    lines.push(rule);
    lines.push(format!(
        "📈 Status: {}/{} prices available",
        report.valid_count(),
        report.prices.len()
    ));
    lines.push(format!("🔄 Refresh: {}", describe_refresh(&report.refresh)));
    lines.join("\n")
}

pub fn describe_refresh(outcome: &RefreshOutcome) -> String {
    match outcome {
        RefreshOutcome::NotNeeded => "not needed".to_string(),
        RefreshOutcome::ReadOnly => "skipped (read-only mode, set PRIVATE_KEY to update)".to_string(),
        RefreshOutcome::Updated(receipt) => format!(
            "updated in tx {:#x} (block {})",
            receipt.tx_hash,
            receipt
                .block_number
                .map(|b| b.to_string())
                .unwrap_or_else(|| "pending".to_string())
        ),
        RefreshOutcome::Failed(e) => format!("failed: {}", e),
    }
}

pub fn render_contract_info(info: &ContractInfo) -> String {
    [
        "📋 Contract Information:".to_string(),
        format!("Contract Address: {:#x}", info.contract_address),
        format!("Pyth Address:     {:#x}", info.aggregator_address),
        format!("Owner:            {:#x}", info.owner_address),
        format!("Balance:          {}", info.balance_display()),
    ]
    .join("\n")
}

/// `getReadablePrice` results, one line per token
pub fn render_readable_prices(prices: &[(Token, OracleResult<Decimal>)]) -> String {
    let mut lines = vec!["🔎 Contract readable prices:".to_string()];
    for (token, price) in prices {
        lines.push(match price {
            Ok(value) => format!("{:<8} {}", token.symbol(), value.normalize()),
            Err(e) => format!("{:<8} {} ({})", token.symbol(), NOT_AVAILABLE, e),
        });
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OracleError;
    use crate::oracle::format_price_at;
    use crate::types::{NormalizedPrice, RawPriceTuple};
    use chrono::{TimeZone, Utc};
    use ethers::types::{Address, U256};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    #[test]
    fn table_shows_valid_and_missing_prices() {
        let now = Utc.timestamp_opt(1_750_000_000, 0).unwrap();
        let eth = format_price_at(
            &RawPriceTuple {
                mantissa: 250_000_000_000,
                confidence: 120_000_000,
                exponent: -8,
                publish_time: 1_749_999_700,
            },
            now,
        );
        let mut prices = BTreeMap::new();
        prices.insert(Token::ETH, eth);
        prices.insert(Token::USDC, NormalizedPrice::unavailable("reverted"));

        let report = SyncReport {
            prices,
            refresh: RefreshOutcome::ReadOnly,
        };
        let table = render_report(&report);

        assert!(table.contains("ETH      | $2500.000000"));
        assert!(table.contains("±1.200000"));
        assert!(table.contains("5m ago"));
        assert!(table.contains("USDC     | Price not available"));
        assert!(table.contains("Status: 1/2 prices available"));
        assert!(table.contains("read-only"));
    }

    #[test]
    fn contract_info_block() {
        let info = ContractInfo {
            contract_address: Address::repeat_byte(0x02),
            aggregator_address: Address::repeat_byte(0xaa),
            owner_address: Address::repeat_byte(0x0b),
            contract_balance: U256::exp10(17),
        };
        let text = render_contract_info(&info);
        assert!(text.contains("0.100000000000000000 ETH"));
        assert!(text.contains(&format!("{:#x}", Address::repeat_byte(0xaa))));
        assert_eq!(text.lines().count(), 5);
    }

    #[test]
    fn readable_prices_list_values_and_errors() {
        let text = render_readable_prices(&[
            (Token::ETH, Ok(dec!(3456.1200))),
            (
                Token::USDT,
                Err(OracleError::ChainCallFailed("reverted".to_string())),
            ),
        ]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "ETH      3456.12");
        assert!(lines[2].starts_with("USDT     N/A"));
        assert!(lines[2].contains("reverted"));
    }
}
