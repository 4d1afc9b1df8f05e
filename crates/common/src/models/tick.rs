use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single market trade as delivered by the feed. Immutable once parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    pub timestamp: DateTime<Utc>,
}

/// One resampled observation inside the rolling window. In bucketed mode the
/// timestamp is aligned to the bucket boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

const QUOTE_ASSETS: &[&str] = &["USDT", "USDC", "FDUSD", "TUSD", "BUSD", "BTC", "ETH", "BNB"];

/// Splits a concatenated pair symbol into (base, quote) using the known
/// quote-asset suffixes, longest first. `BTCUSDT` -> `("BTC", "USDT")`.
pub fn symbol_assets(symbol: &str) -> Option<(String, String)> {
    let upper = symbol.to_uppercase();
    for quote in QUOTE_ASSETS {
        if let Some(base) = upper.strip_suffix(quote) {
            if !base.is_empty() {
                return Some((base.to_string(), quote.to_string()));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_common_pairs() {
        assert_eq!(
            symbol_assets("BTCUSDT"),
            Some(("BTC".to_string(), "USDT".to_string()))
        );
        assert_eq!(
            symbol_assets("ethbtc"),
            Some(("ETH".to_string(), "BTC".to_string()))
        );
        assert_eq!(symbol_assets("USDT"), None);
        assert_eq!(symbol_assets("XYZABC"), None);
    }
}
