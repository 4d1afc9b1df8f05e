use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use common::error::BotError;
use common::models::{Order, Side};

use super::map_db_err;

type OrderRow = (
    String,
    String,
    String,
    String,
    f64,
    f64,
    f64,
    f64,
    String,
    String,
);

pub struct OrdersRepository;

impl OrdersRepository {
    /// Records a fill atomically: inserts the order and flips its signal
    /// pending -> filled in one transaction, so the store never holds an
    /// order whose signal is still pending. The unique constraint on
    /// `signal_id` turns a double execution into `DuplicateSignal`. Returns
    /// whether this call performed the status transition.
    pub async fn record_fill(pool: &SqlitePool, order: &Order) -> Result<bool, BotError> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| map_db_err(e, &order.signal_id))?;
        sqlx::query(
            r#"
                INSERT INTO trade_orders
                    (id, signal_id, symbol, side, amount, price, stop_loss,
                     take_profit, timestamp, status)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order.id)
        .bind(&order.signal_id)
        .bind(&order.symbol)
        .bind(order.side.as_str())
        .bind(order.amount)
        .bind(order.price)
        .bind(order.stop_loss)
        .bind(order.take_profit)
        .bind(order.timestamp.to_rfc3339())
        .bind(&order.status)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_db_err(e, &order.signal_id))?;

        let result = sqlx::query(
            "UPDATE trade_signals SET status = 'filled' WHERE id = ? AND status = 'pending'",
        )
        .bind(&order.signal_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_db_err(e, &order.signal_id))?;

        tx.commit()
            .await
            .map_err(|e| map_db_err(e, &order.signal_id))?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn find_by_signal(
        pool: &SqlitePool,
        signal_id: &str,
    ) -> Result<Option<Order>, BotError> {
        let row: Option<OrderRow> = sqlx::query_as(
            r#"
                SELECT id, signal_id, symbol, side, amount, price, stop_loss,
                       take_profit, timestamp, status
                FROM trade_orders
                WHERE signal_id = ?
            "#,
        )
        .bind(signal_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| map_db_err(e, signal_id))?;

        row.map(from_row).transpose()
    }

    /// Most recent order of the given side, the executor-cooldown reference.
    pub async fn find_latest_by_side(
        pool: &SqlitePool,
        symbol: &str,
        side: Side,
    ) -> Result<Option<Order>, BotError> {
        let row: Option<OrderRow> = sqlx::query_as(
            r#"
                SELECT id, signal_id, symbol, side, amount, price, stop_loss,
                       take_profit, timestamp, status
                FROM trade_orders
                WHERE symbol = ? AND side = ?
                ORDER BY timestamp DESC LIMIT 1
            "#,
        )
        .bind(symbol)
        .bind(side.as_str())
        .fetch_optional(pool)
        .await
        .map_err(|e| map_db_err(e, symbol))?;

        row.map(from_row).transpose()
    }

    pub async fn count_for_signal(pool: &SqlitePool, signal_id: &str) -> Result<i64, BotError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM trade_orders WHERE signal_id = ?")
                .bind(signal_id)
                .fetch_one(pool)
                .await
                .map_err(|e| map_db_err(e, signal_id))?;
        Ok(count)
    }
}

fn from_row(row: OrderRow) -> Result<Order, BotError> {
    let (id, signal_id, symbol, side, amount, price, stop_loss, take_profit, timestamp, status) =
        row;
    Ok(Order {
        id,
        signal_id,
        symbol,
        side: side.parse::<Side>()?,
        amount,
        price,
        stop_loss,
        take_profit,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map_err(|e| BotError::TransientIo(format!("bad timestamp: {e}")))?
            .with_timezone(&Utc),
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use crate::repositories::SignalsRepository;
    use chrono::TimeZone;
    use common::models::Signal;

    async fn seed_signal(pool: &SqlitePool, side: Side, at_secs: i64) -> Signal {
        let at = Utc.timestamp_opt(1_739_361_600 + at_secs, 0).unwrap();
        let signal = Signal::pending("BTCUSDT", side, 97_000.0, at);
        SignalsRepository::insert(pool, &signal).await.unwrap();
        signal
    }

    #[tokio::test]
    async fn record_fill_inserts_and_flips_the_signal_together() {
        let pool = connect_in_memory().await.unwrap();
        let signal = seed_signal(&pool, Side::Buy, 0).await;

        let order = Order::filled(&signal, 0.0001, 1.0, 2.0);
        assert!(OrdersRepository::record_fill(&pool, &order).await.unwrap());

        let stored = crate::repositories::SignalsRepository::find_by_id(&pool, &signal.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, common::models::SignalStatus::Filled);

        let found = OrdersRepository::find_by_signal(&pool, &signal.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, order.id);
    }

    #[tokio::test]
    async fn one_order_per_signal_is_enforced() {
        let pool = connect_in_memory().await.unwrap();
        let signal = seed_signal(&pool, Side::Buy, 0).await;

        let order = Order::filled(&signal, 0.0001, 1.0, 2.0);
        OrdersRepository::record_fill(&pool, &order).await.unwrap();

        let second = Order::filled(&signal, 0.0001, 1.0, 2.0);
        let err = OrdersRepository::record_fill(&pool, &second)
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::DuplicateSignal(_)));

        assert_eq!(
            OrdersRepository::count_for_signal(&pool, &signal.id)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn latest_by_side_ignores_the_other_side() {
        let pool = connect_in_memory().await.unwrap();
        let buy = seed_signal(&pool, Side::Buy, 0).await;
        let sell = seed_signal(&pool, Side::Sell, 600).await;

        OrdersRepository::record_fill(&pool, &Order::filled(&buy, 0.0001, 1.0, 2.0))
            .await
            .unwrap();
        OrdersRepository::record_fill(&pool, &Order::filled(&sell, 0.0001, 1.0, 2.0))
            .await
            .unwrap();

        let latest_buy = OrdersRepository::find_latest_by_side(&pool, "BTCUSDT", Side::Buy)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest_buy.signal_id, buy.id);
        assert_eq!(latest_buy.side, Side::Buy);
    }
}
