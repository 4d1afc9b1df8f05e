pub mod order;
pub mod signal;
pub mod tick;

pub use order::{Order, protective_prices};
pub use signal::{Side, Signal, SignalStatus};
pub use tick::{PricePoint, Tick, symbol_assets};
