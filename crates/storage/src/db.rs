use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{self, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

const SCHEMA: &str = include_str!("../sql/schema.sql");

/// Opens (and creates if missing) the bot database and applies the schema.
pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlite::SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePool::connect_with(options).await?;
    sqlx::query(SCHEMA).execute(&pool).await?;
    Ok(pool)
}

/// In-memory database on a single connection, so every handle cloned from the
/// pool sees the same data. Used by tests across the workspace.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    sqlx::query(SCHEMA).execute(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_applies_cleanly() {
        let pool = connect_in_memory().await.unwrap();
        for table in ["trades", "trade_signals", "trade_orders"] {
            let count: (i64,) =
                sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
                    .fetch_one(&pool)
                    .await
                    .unwrap();
            assert_eq!(count.0, 0);
        }
    }
}
