use chrono::{DateTime, Utc};
use serde::Deserialize;

use common::models::Tick;

/// Envelope of the combined stream: `{"stream": "...", "data": {...}}`.
#[derive(Deserialize, Debug)]
pub struct CombinedStreamEvent {
    pub stream: String,
    pub data: serde_json::Value,
}

/// Payload of a `<symbol>@trade` event.
#[derive(Deserialize, Debug)]
pub struct TradeEvent {
    #[serde(rename(deserialize = "s"))]
    pub symbol: String,
    #[serde(rename(deserialize = "p"))]
    pub price: String,
    #[serde(rename(deserialize = "q"))]
    pub quantity: String,
    /// Trade time, epoch milliseconds.
    #[serde(rename(deserialize = "T"))]
    pub trade_time: i64,
}

impl TradeEvent {
    pub fn to_tick(&self) -> Result<Tick, serde_json::Error> {
        let timestamp: DateTime<Utc> = DateTime::from_timestamp_millis(self.trade_time)
            .unwrap_or_else(Utc::now);

        Ok(Tick {
            symbol: self.symbol.to_uppercase(),
            price: self.price.parse::<f64>().unwrap_or(0_f64),
            quantity: self.quantity.parse::<f64>().unwrap_or(0_f64),
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_combined_trade_frame() {
        let frame = r#"{
            "stream": "btcusdt@trade",
            "data": {
                "e": "trade", "E": 1739361600123, "s": "BTCUSDT",
                "t": 12345, "p": "97321.07", "q": "0.00042",
                "T": 1739361600120, "m": false, "M": true
            }
        }"#;

        let event: CombinedStreamEvent = serde_json::from_str(frame).unwrap();
        assert!(event.stream.ends_with("@trade"));

        let trade: TradeEvent = serde_json::from_value(event.data).unwrap();
        let tick = trade.to_tick().unwrap();
        assert_eq!(tick.symbol, "BTCUSDT");
        assert_eq!(tick.price, 97_321.07);
        assert_eq!(tick.quantity, 0.00042);
        assert_eq!(tick.timestamp.timestamp_millis(), 1_739_361_600_120);
    }
}
