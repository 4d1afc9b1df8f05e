use sqlx::SqlitePool;

use common::error::BotError;
use common::models::Tick;

use super::map_db_err;

pub struct TradesRepository;

impl TradesRepository {
    pub async fn insert_batch(pool: &SqlitePool, ticks: &[Tick]) -> Result<(), BotError> {
        if ticks.is_empty() {
            return Ok(());
        }

        let mut tx = pool.begin().await.map_err(|e| map_db_err(e, "trades"))?;
        for tick in ticks {
            sqlx::query(
                "INSERT INTO trades (symbol, price, quantity, timestamp) VALUES (?, ?, ?, ?)",
            )
            .bind(&tick.symbol)
            .bind(tick.price)
            .bind(tick.quantity)
            .bind(tick.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_db_err(e, "trades"))?;
        }
        tx.commit().await.map_err(|e| map_db_err(e, "trades"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn batch_insert_persists_every_tick() {
        let pool = connect_in_memory().await.unwrap();
        let base = Utc.timestamp_opt(1_739_361_600, 0).unwrap();
        let ticks: Vec<Tick> = (0..5)
            .map(|i| Tick {
                symbol: "BTCUSDT".to_string(),
                price: 97_000.0 + i as f64,
                quantity: 0.01,
                timestamp: base + chrono::Duration::seconds(i),
            })
            .collect();

        TradesRepository::insert_batch(&pool, &ticks).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trades")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 5);
    }
}
