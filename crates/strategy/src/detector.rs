use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use common::models::{PricePoint, Side, Signal};

use crate::sma::SmaPair;

/// Why a crossover did not become a signal. Recorded for observability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SuppressReason {
    /// The last emitted signal was already this side; a BUY cannot follow a
    /// BUY without an intervening SELL.
    DuplicateSide,
    /// Too soon after the last emission (either side).
    Cooldown { remaining_secs: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// No crossover on this sample.
    Hold,
    Suppressed { side: Side, reason: SuppressReason },
    Emit(Signal),
}

/// Per-symbol crossover state machine: either no live signal or an active
/// one on `last_side`. Single writer per symbol.
pub struct SignalDetector {
    symbol: String,
    cooldown: Duration,
    prev: Option<SmaPair>,
    last_side: Option<Side>,
    last_emitted_at: Option<DateTime<Utc>>,
}

impl SignalDetector {
    pub fn new(symbol: &str, cooldown: std::time::Duration) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            cooldown: Duration::from_std(cooldown).unwrap_or_else(|_| Duration::seconds(0)),
            prev: None,
            last_side: None,
            last_emitted_at: None,
        }
    }

    /// Feeds one SMA pair through the state machine. An `Emit` is a proposal:
    /// the caller persists and publishes it, then confirms with
    /// [`mark_emitted`](Self::mark_emitted) so the cooldown marker and the
    /// stored signal advance together.
    pub fn evaluate(&mut self, point: &PricePoint, current: SmaPair) -> Evaluation {
        let prev = self.prev.replace(current);
        let Some(prev) = prev else {
            return Evaluation::Hold;
        };

        let side = if prev.short <= prev.long && current.short > current.long {
            Side::Buy
        } else if prev.short >= prev.long && current.short < current.long {
            Side::Sell
        } else {
            return Evaluation::Hold;
        };

        if self.last_side == Some(side) {
            debug!(symbol = %self.symbol, %side, "suppressing same-side crossover");
            return Evaluation::Suppressed {
                side,
                reason: SuppressReason::DuplicateSide,
            };
        }

        if let Some(last_at) = self.last_emitted_at {
            let elapsed = point.timestamp - last_at;
            if elapsed < self.cooldown {
                let remaining_secs = (self.cooldown - elapsed).num_seconds();
                debug!(symbol = %self.symbol, %side, remaining_secs, "cooldown active");
                return Evaluation::Suppressed {
                    side,
                    reason: SuppressReason::Cooldown { remaining_secs },
                };
            }
        }

        Evaluation::Emit(Signal::pending(
            &self.symbol,
            side,
            point.price,
            point.timestamp,
        ))
    }

    /// Advances the dedup/cooldown markers once the signal is known to exist
    /// in the store, whether this process inserted it or a redelivery found
    /// it already there.
    pub fn mark_emitted(&mut self, side: Side, at: DateTime<Utc>) {
        self.last_side = Some(side);
        self.last_emitted_at = Some(at);
    }
}
