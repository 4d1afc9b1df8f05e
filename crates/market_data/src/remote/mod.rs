use std::env;

pub mod binance_client;
pub mod trade_response;

pub use binance_client::BinanceClient;
pub use trade_response::{CombinedStreamEvent, TradeEvent};

pub fn get_ws_base_url() -> String {
    env::var("BINANCE_WS_URL")
        .unwrap_or_else(|_| "wss://stream.binance.com:9443/stream?streams=".to_string())
}
