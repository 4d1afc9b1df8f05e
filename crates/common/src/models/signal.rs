use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BotError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    /// The side that closes a position opened by `self`. Protective orders
    /// for a BUY are SELL limits and vice versa.
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(BotError::TransientIo(format!("unknown side '{other}'"))),
        }
    }
}

/// Lifecycle status of a signal. Transitions are monotonic:
/// pending -> filled (executor) or pending -> skipped (expiry sweep).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Pending,
    Filled,
    Skipped,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Pending => "pending",
            SignalStatus::Filled => "filled",
            SignalStatus::Skipped => "skipped",
        }
    }
}

impl FromStr for SignalStatus {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SignalStatus::Pending),
            "filled" => Ok(SignalStatus::Filled),
            "skipped" => Ok(SignalStatus::Skipped),
            other => Err(BotError::TransientIo(format!("unknown status '{other}'"))),
        }
    }
}

/// A crossover event accepted by the detector. The id doubles as the
/// idempotency key, so redelivered ticks regenerate the same id and the
/// store's primary key absorbs the duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub status: SignalStatus,
}

impl Signal {
    pub fn idempotency_key(symbol: &str, side: Side, at: DateTime<Utc>) -> String {
        format!("{}-{}-{}", symbol.to_uppercase(), side, at.timestamp())
    }

    pub fn pending(symbol: &str, side: Side, price: f64, at: DateTime<Utc>) -> Self {
        Self {
            id: Self::idempotency_key(symbol, side, at),
            symbol: symbol.to_uppercase(),
            side,
            price,
            timestamp: at,
            status: SignalStatus::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn idempotency_key_is_deterministic() {
        let at = Utc.with_ymd_and_hms(2025, 2, 12, 12, 0, 0).unwrap();
        let a = Signal::pending("btcusdt", Side::Buy, 50_000.0, at);
        let b = Signal::pending("BTCUSDT", Side::Buy, 50_000.0, at);
        assert_eq!(a.id, b.id);
        assert_eq!(a.id, "BTCUSDT-BUY-1739361600");
    }

    #[test]
    fn wire_schema_round_trips() {
        let at = Utc.with_ymd_and_hms(2025, 2, 12, 12, 0, 0).unwrap();
        let signal = Signal::pending("BTCUSDT", Side::Sell, 97_123.5, at);
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["side"], "SELL");
        assert_eq!(json["status"], "pending");
        let back: Signal = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, signal.id);
        assert_eq!(back.timestamp, at);
    }
}
