use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use common::error::BotError;
use common::models::{Side, Signal, SignalStatus};

use super::map_db_err;

type SignalRow = (String, String, String, f64, String, String);

pub struct SignalsRepository;

impl SignalsRepository {
    /// Inserts a freshly emitted signal. A second insert with the same
    /// idempotency key returns `DuplicateSignal`.
    pub async fn insert(pool: &SqlitePool, signal: &Signal) -> Result<(), BotError> {
        sqlx::query(
            r#"
                INSERT INTO trade_signals (id, symbol, side, price, timestamp, status)
                VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&signal.id)
        .bind(&signal.symbol)
        .bind(signal.side.as_str())
        .bind(signal.price)
        .bind(signal.timestamp.to_rfc3339())
        .bind(signal.status.as_str())
        .execute(pool)
        .await
        .map_err(|e| map_db_err(e, &signal.id))?;
        Ok(())
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Signal>, BotError> {
        let row: Option<SignalRow> = sqlx::query_as(
            "SELECT id, symbol, side, price, timestamp, status FROM trade_signals WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| map_db_err(e, id))?;

        row.map(from_row).transpose()
    }

    /// Most recent signal for a symbol, optionally restricted by status.
    pub async fn find_latest(
        pool: &SqlitePool,
        symbol: &str,
        status: Option<SignalStatus>,
    ) -> Result<Option<Signal>, BotError> {
        let row: Option<SignalRow> = match status {
            Some(status) => {
                sqlx::query_as(
                    r#"
                        SELECT id, symbol, side, price, timestamp, status
                        FROM trade_signals
                        WHERE symbol = ? AND status = ?
                        ORDER BY timestamp DESC LIMIT 1
                    "#,
                )
                .bind(symbol)
                .bind(status.as_str())
                .fetch_optional(pool)
                .await
            }
            None => {
                sqlx::query_as(
                    r#"
                        SELECT id, symbol, side, price, timestamp, status
                        FROM trade_signals
                        WHERE symbol = ?
                        ORDER BY timestamp DESC LIMIT 1
                    "#,
                )
                .bind(symbol)
                .fetch_optional(pool)
                .await
            }
        }
        .map_err(|e| map_db_err(e, symbol))?;

        row.map(from_row).transpose()
    }

    /// Compare-and-set transition pending -> filled. Returns whether this
    /// call performed the transition; a concurrent worker that lost the race
    /// sees `false`.
    pub async fn mark_filled(pool: &SqlitePool, id: &str) -> Result<bool, BotError> {
        let result = sqlx::query(
            "UPDATE trade_signals SET status = 'filled' WHERE id = ? AND status = 'pending'",
        )
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| map_db_err(e, id))?;
        Ok(result.rows_affected() == 1)
    }

    /// Sweeps pending signals generated before `cutoff` to `skipped`.
    pub async fn expire_stale(
        pool: &SqlitePool,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, BotError> {
        let result = sqlx::query(
            "UPDATE trade_signals SET status = 'skipped' WHERE status = 'pending' AND timestamp < ?",
        )
        .bind(cutoff.to_rfc3339())
        .execute(pool)
        .await
        .map_err(|e| map_db_err(e, "expire_stale"))?;
        Ok(result.rows_affected())
    }
}

fn from_row(row: SignalRow) -> Result<Signal, BotError> {
    let (id, symbol, side, price, timestamp, status) = row;
    Ok(Signal {
        id,
        symbol,
        side: side.parse::<Side>()?,
        price,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map_err(|e| BotError::TransientIo(format!("bad timestamp: {e}")))?
            .with_timezone(&Utc),
        status: status.parse::<SignalStatus>()?,
    })
}
