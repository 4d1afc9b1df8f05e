pub mod orders_repo;
pub mod signals_repo;
pub mod trades_repo;

pub use orders_repo::OrdersRepository;
pub use signals_repo::SignalsRepository;
pub use trades_repo::TradesRepository;

use common::error::BotError;

/// Maps driver errors onto the pipeline taxonomy: a unique-key collision is a
/// redelivered event, anything else is a transient store failure.
pub(crate) fn map_db_err(err: sqlx::Error, key: &str) -> BotError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return BotError::DuplicateSignal(key.to_string());
        }
    }
    BotError::TransientIo(err.to_string())
}
