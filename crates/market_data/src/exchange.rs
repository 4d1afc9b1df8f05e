use std::collections::HashMap;

use async_trait::async_trait;

use common::error::BotError;
use common::models::Side;

/// Free balances per asset, as reported by the exchange.
#[derive(Debug, Clone, Default)]
pub struct Balances {
    free: HashMap<String, f64>,
}

impl Balances {
    pub fn new(free: HashMap<String, f64>) -> Self {
        Self { free }
    }

    pub fn free(&self, asset: &str) -> f64 {
        self.free.get(asset).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct Ticker {
    pub last: f64,
}

/// The exchange's acknowledgement of a placed order.
#[derive(Debug, Clone)]
pub struct OrderHandle {
    pub order_id: String,
    pub status: String,
}

/// What the executor needs from an exchange. Injected at construction so
/// tests can swap in a double; implementations must not retry internally,
/// the executor owns timeout and retry policy.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    async fn fetch_balance(&self) -> Result<Balances, BotError>;

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, BotError>;

    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        amount: f64,
    ) -> Result<OrderHandle, BotError>;

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: Side,
        amount: f64,
        price: f64,
    ) -> Result<OrderHandle, BotError>;
}
