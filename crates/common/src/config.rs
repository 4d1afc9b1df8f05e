use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::BotError;

/// How ticks enter the rolling price window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    /// Every tick is appended directly.
    Tick,
    /// Ticks are grouped into fixed-duration buckets; the first price in a
    /// bucket wins and empty buckets are forward-filled.
    Bucketed { bucket_secs: u64 },
}

/// How the window produces a snapshot for the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingPolicy {
    /// Exactly `long_window` points or nothing.
    Strict,
    /// Best-effort tail of whatever is available.
    Flexible,
}

impl FromStr for SamplingPolicy {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "flexible" => Ok(Self::Flexible),
            other => Err(BotError::Config(format!(
                "unknown sampling policy '{other}', expected strict|flexible"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub symbols: Vec<String>,
    pub short_window: usize,
    pub long_window: usize,
    pub ingest_mode: IngestMode,
    pub sampling_policy: SamplingPolicy,
    /// Detector-level cooldown between emitted signals (any side).
    pub signal_cooldown: Duration,
    /// Executor-level cooldown measured against the last filled order.
    pub order_cooldown: Duration,
    pub order_size: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub lease_ttl: Duration,
    pub exchange_timeout: Duration,
    pub place_protective_orders: bool,
    /// Pending signals older than this are swept to `skipped`.
    pub signal_expiry: Duration,
    pub database_url: String,
}

impl BotConfig {
    /// Reads the full configuration from the environment. This is the only
    /// place where a malformed value is fatal.
    pub fn from_env() -> Result<Self, BotError> {
        let symbols: Vec<String> = env::var("SYMBOLS")
            .unwrap_or_else(|_| "BTCUSDT".to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() {
            return Err(BotError::Config("SYMBOLS is empty".to_string()));
        }

        let short_window = parse_var("SHORT_WINDOW", 50usize)?;
        let long_window = parse_var("LONG_WINDOW", 200usize)?;
        if short_window == 0 || short_window >= long_window {
            return Err(BotError::Config(format!(
                "window lengths must satisfy 0 < short ({short_window}) < long ({long_window})"
            )));
        }

        let bucket_secs = parse_var("BUCKET_SECS", 0u64)?;
        let ingest_mode = if bucket_secs == 0 {
            IngestMode::Tick
        } else {
            IngestMode::Bucketed { bucket_secs }
        };

        let sampling_policy = env::var("SAMPLING_POLICY")
            .unwrap_or_else(|_| "strict".to_string())
            .parse()?;

        Ok(Self {
            symbols,
            short_window,
            long_window,
            ingest_mode,
            sampling_policy,
            signal_cooldown: Duration::from_secs(parse_var("SIGNAL_COOLDOWN_SECS", 300u64)?),
            order_cooldown: Duration::from_secs(parse_var("ORDER_COOLDOWN_SECS", 0u64)?),
            order_size: parse_var("ORDER_SIZE", 0.0001f64)?,
            stop_loss_pct: parse_var("STOP_LOSS_PCT", 1.0f64)?,
            take_profit_pct: parse_var("TAKE_PROFIT_PCT", 2.0f64)?,
            lease_ttl: Duration::from_secs(parse_var("LEASE_TTL_SECS", 5u64)?),
            exchange_timeout: Duration::from_secs(parse_var("EXCHANGE_TIMEOUT_SECS", 10u64)?),
            place_protective_orders: parse_var("PLACE_PROTECTIVE_ORDERS", false)?,
            signal_expiry: Duration::from_secs(parse_var("SIGNAL_EXPIRY_SECS", 3600u64)?),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:data/trading.db".to_string()),
        })
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T, BotError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| BotError::Config(format!("{key}={raw}: {e}"))),
        Err(_) => Ok(default),
    }
}
