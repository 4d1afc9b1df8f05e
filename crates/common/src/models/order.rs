use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::signal::{Side, Signal};

/// An executed order. Created exactly once per signal that reaches `filled`;
/// the store enforces this with a unique constraint on `signal_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub signal_id: String,
    pub symbol: String,
    pub side: Side,
    pub amount: f64,
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub timestamp: DateTime<Utc>,
    pub status: String,
}

impl Order {
    /// Builds the filled-order record for a signal. Stop-loss and take-profit
    /// are percentage offsets from the signal price, not the live ticker.
    pub fn filled(signal: &Signal, amount: f64, stop_loss_pct: f64, take_profit_pct: f64) -> Self {
        let (stop_loss, take_profit) = protective_prices(
            signal.side,
            signal.price,
            stop_loss_pct,
            take_profit_pct,
        );
        Self {
            id: Uuid::new_v4().to_string(),
            signal_id: signal.id.clone(),
            symbol: signal.symbol.clone(),
            side: signal.side,
            amount,
            price: signal.price,
            stop_loss,
            take_profit,
            timestamp: Utc::now(),
            status: "filled".to_string(),
        }
    }
}

/// (stop_loss, take_profit) for a position entered at `price`.
pub fn protective_prices(side: Side, price: f64, sl_pct: f64, tp_pct: f64) -> (f64, f64) {
    match side {
        Side::Buy => (
            price * (1.0 - sl_pct / 100.0),
            price * (1.0 + tp_pct / 100.0),
        ),
        Side::Sell => (
            price * (1.0 + sl_pct / 100.0),
            price * (1.0 - tp_pct / 100.0),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protective_prices_mirror_by_side() {
        let (sl, tp) = protective_prices(Side::Buy, 100.0, 1.0, 2.0);
        assert!((sl - 99.0).abs() < 1e-9);
        assert!((tp - 102.0).abs() < 1e-9);

        let (sl, tp) = protective_prices(Side::Sell, 100.0, 1.0, 2.0);
        assert!((sl - 101.0).abs() < 1e-9);
        assert!((tp - 98.0).abs() < 1e-9);
    }
}
