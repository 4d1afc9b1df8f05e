use std::collections::HashMap;
use std::env;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{error, info};

use common::error::BotError;
use common::models::Side;

use crate::exchange::{Balances, ExchangeApi, OrderHandle, Ticker};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(rename = "orderId")]
    order_id: u64,
    status: String,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    asset: String,
    free: String,
}

#[derive(Debug, Deserialize)]
struct AccountInformation {
    balances: Vec<BalanceEntry>,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

/// Signed Binance spot REST client. Every request carries the configured
/// timeout so an unresponsive exchange can never stall an executor loop.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    api_key: String,
    secret_key: String,
}

impl BinanceClient {
    pub fn from_env(timeout: Duration) -> Result<Self, BotError> {
        let api_key = env::var("BINANCE_API_KEY")
            .map_err(|_| BotError::Config("BINANCE_API_KEY not set".to_string()))?;
        let secret_key = env::var("BINANCE_SECRET_KEY")
            .map_err(|_| BotError::Config("BINANCE_SECRET_KEY not set".to_string()))?;
        let base_url = env::var("BINANCE_BASE_URL")
            .unwrap_or_else(|_| "https://api.binance.com".to_string());

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BotError::Config(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key,
            secret_key,
        })
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_millis() as u64
    }

    async fn signed_request(
        &self,
        method: Method,
        path: &str,
        params: String,
    ) -> Result<reqwest::Response, BotError> {
        let signature = self.sign(&params);
        let url = format!("{}{}?{}&signature={}", self.base_url, path, params, signature);

        let resp = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(transport_err)?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.map_err(transport_err)?;
            error!("Binance request failed: {error_text}");
            return Err(BotError::ExchangeRejection(error_text));
        }
        Ok(resp)
    }

    async fn post_order(&self, params: String) -> Result<OrderHandle, BotError> {
        let resp = self
            .signed_request(Method::POST, "/api/v3/order", params)
            .await?;
        let order = resp
            .json::<OrderResponse>()
            .await
            .map_err(transport_err)?;
        info!("order accepted: id={} status={}", order.order_id, order.status);
        Ok(OrderHandle {
            order_id: order.order_id.to_string(),
            status: order.status,
        })
    }
}

fn transport_err(e: reqwest::Error) -> BotError {
    if e.is_timeout() || e.is_connect() {
        BotError::TransientIo(e.to_string())
    } else {
        BotError::ExchangeRejection(e.to_string())
    }
}

#[async_trait]
impl ExchangeApi for BinanceClient {
    async fn fetch_balance(&self) -> Result<Balances, BotError> {
        let params = format!("timestamp={}", Self::timestamp_ms());
        let resp = self
            .signed_request(Method::GET, "/api/v3/account", params)
            .await?;
        let account = resp
            .json::<AccountInformation>()
            .await
            .map_err(transport_err)?;

        let free: HashMap<String, f64> = account
            .balances
            .into_iter()
            .map(|b| (b.asset, b.free.parse::<f64>().unwrap_or(0.0)))
            .collect();
        Ok(Balances::new(free))
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, BotError> {
        // Public endpoint, no signature needed.
        let url = format!(
            "{}/api/v3/ticker/price?symbol={}",
            self.base_url,
            symbol.to_uppercase()
        );
        let resp = self.client.get(&url).send().await.map_err(transport_err)?;
        if !resp.status().is_success() {
            let error_text = resp.text().await.map_err(transport_err)?;
            return Err(BotError::ExchangeRejection(error_text));
        }
        let ticker = resp.json::<TickerPrice>().await.map_err(transport_err)?;
        let last = ticker
            .price
            .parse::<f64>()
            .map_err(|e| BotError::ExchangeRejection(format!("bad ticker price: {e}")))?;
        Ok(Ticker { last })
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        amount: f64,
    ) -> Result<OrderHandle, BotError> {
        let params = format!(
            "symbol={}&side={}&type=MARKET&quantity={}&timestamp={}",
            symbol.to_uppercase(),
            side,
            amount,
            Self::timestamp_ms()
        );
        info!("placing market order: {side} {amount} {symbol}");
        self.post_order(params).await
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: Side,
        amount: f64,
        price: f64,
    ) -> Result<OrderHandle, BotError> {
        let params = format!(
            "symbol={}&side={}&type=LIMIT&timeInForce=GTC&quantity={}&price={}&timestamp={}",
            symbol.to_uppercase(),
            side,
            amount,
            price,
            Self::timestamp_ms()
        );
        info!("placing limit order: {side} {amount} {symbol} @ {price}");
        self.post_order(params).await
    }
}
