use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use common::actors::{Actor, ActorType, ControlMessage};
use common::config::BotConfig;
use common::error::BotError;
use common::models::{Order, Side, Signal, SignalStatus, symbol_assets};
use market_data::exchange::ExchangeApi;
use storage::lease::LeaseManager;
use storage::repositories::{OrdersRepository, SignalsRepository};

/// How the executor disposed of one delivered signal. Everything except
/// `Filled` leaves the stored signal exactly as it was.
#[derive(Debug)]
pub enum ExecutionOutcome {
    Filled(Order),
    /// Another worker holds the lease for this signal.
    LeaseHeld,
    /// The stored signal is no longer pending (or was never stored).
    NotPending,
    /// The last filled order of this side is too recent.
    CooldownActive,
    InsufficientFunds,
}

/// Consumes pending signals and turns each into at most one exchange order.
/// Safe to run in several instances at once: the lease serializes workers,
/// the pending re-check and the unique order constraint absorb redelivery.
pub struct ExecutionService {
    id: Uuid,
    cfg: BotConfig,
    pool: SqlitePool,
    exchange: Arc<dyn ExchangeApi>,
    leases: Arc<dyn LeaseManager>,
    signal_rx: broadcast::Receiver<Signal>,
    confirm_tx: broadcast::Sender<Order>,
}

#[async_trait]
impl Actor for ExecutionService {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> ActorType {
        ActorType::ExecutionActor
    }

    async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
        let heartbeat_handle = self.spawn_heartbeat(supervisor_tx.clone());

        info!("Starting Execution Service");
        let mut expiry_interval = time::interval(Duration::from_secs(60));

        loop {
            tokio::select! {
                received = self.signal_rx.recv() => {
                    match received {
                        Ok(signal) => {
                            info!(id = %signal.id, side = %signal.side, price = signal.price,
                                  "signal received");
                            match self.handle_signal(&signal).await {
                                Ok(outcome) => debug!(id = %signal.id, ?outcome, "signal handled"),
                                // A failed cycle leaves the signal pending for
                                // a later attempt; the loop survives.
                                Err(e) => error!(id = %signal.id, "execution failed: {e}"),
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("execution service lagged: missed {n} signals");
                        }
                        Err(_) => {
                            heartbeat_handle.abort();
                            supervisor_tx
                                .send(ControlMessage::Error(
                                    self.id,
                                    "signal channel closed unexpectedly".to_string(),
                                ))
                                .await?;
                            bail!("signal channel closed unexpectedly");
                        }
                    }
                }

                _ = expiry_interval.tick() => {
                    let cutoff = Utc::now()
                        - chrono::Duration::from_std(self.cfg.signal_expiry)
                            .unwrap_or_else(|_| chrono::Duration::hours(1));
                    match SignalsRepository::expire_stale(&self.pool, cutoff).await {
                        Ok(0) => {}
                        Ok(n) => warn!("expired {n} stale pending signals"),
                        Err(e) => error!("expiry sweep failed: {e}"),
                    }
                }
            }
        }
    }
}

impl ExecutionService {
    pub fn new(
        cfg: BotConfig,
        pool: SqlitePool,
        exchange: Arc<dyn ExchangeApi>,
        leases: Arc<dyn LeaseManager>,
        signal_rx: broadcast::Receiver<Signal>,
        confirm_tx: broadcast::Sender<Order>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            cfg,
            pool,
            exchange,
            leases,
            signal_rx,
            confirm_tx,
        }
    }

    /// Processes one delivered signal under its lease. Returns `Ok` for every
    /// expected disposition; `Err` means the attempt failed and the signal is
    /// still pending.
    pub async fn handle_signal(&self, signal: &Signal) -> Result<ExecutionOutcome, BotError> {
        let lease_key = format!("signal:{}", signal.id);
        let Some(token) = self.leases.acquire(&lease_key, self.cfg.lease_ttl).await else {
            debug!(id = %signal.id, "lease held by another worker, skipping");
            return Ok(ExecutionOutcome::LeaseHeld);
        };

        let result = self.execute_locked(signal).await;
        self.leases.release(&lease_key, &token).await;
        result
    }

    async fn execute_locked(&self, signal: &Signal) -> Result<ExecutionOutcome, BotError> {
        // Re-read: redelivery and racing workers land here after the winner
        // already flipped the status.
        let stored = SignalsRepository::find_by_id(&self.pool, &signal.id).await?;
        let pending = match stored {
            Some(s) if s.status == SignalStatus::Pending => s,
            Some(_) => {
                debug!(id = %signal.id, "signal no longer pending, skipping");
                return Ok(ExecutionOutcome::NotPending);
            }
            None => {
                warn!(id = %signal.id, "delivered signal missing from store");
                return Ok(ExecutionOutcome::NotPending);
            }
        };

        // A store that already holds an order for a still-pending signal
        // (a fill that died before its status flip landed) must be completed,
        // not re-executed.
        if let Some(existing) = OrdersRepository::find_by_signal(&self.pool, &pending.id).await? {
            warn!(
                id = %pending.id, order_id = %existing.id,
                "order already recorded, completing the fill"
            );
            if SignalsRepository::mark_filled(&self.pool, &pending.id).await? {
                let _ = self.confirm_tx.send(existing.clone());
            }
            return Ok(ExecutionOutcome::Filled(existing));
        }

        // Executor-level cooldown, independent of the detector's. It guards
        // against a backlog of pending signals accumulated upstream.
        if !self.cfg.order_cooldown.is_zero() {
            if let Some(last) =
                OrdersRepository::find_latest_by_side(&self.pool, &pending.symbol, pending.side)
                    .await?
            {
                let elapsed = Utc::now() - last.timestamp;
                let cooldown = chrono::Duration::from_std(self.cfg.order_cooldown)
                    .unwrap_or_else(|_| chrono::Duration::zero());
                if elapsed < cooldown {
                    warn!(
                        id = %pending.id, elapsed_secs = elapsed.num_seconds(),
                        "order cooldown active, leaving signal pending"
                    );
                    return Ok(ExecutionOutcome::CooldownActive);
                }
            }
        }

        let Some((base, quote)) = symbol_assets(&pending.symbol) else {
            return Err(BotError::Config(format!(
                "cannot split symbol '{}' into assets",
                pending.symbol
            )));
        };

        let balances = self.with_timeout(self.exchange.fetch_balance()).await?;
        let ticker = self
            .with_timeout(self.exchange.fetch_ticker(&pending.symbol))
            .await?;

        let (asset, required) = match pending.side {
            Side::Buy => (quote, self.cfg.order_size * ticker.last),
            Side::Sell => (base, self.cfg.order_size),
        };
        // The balance must strictly exceed the required amount.
        let free = balances.free(&asset);
        if free <= required {
            warn!(
                id = %pending.id, %asset, free, required,
                "insufficient balance, leaving signal pending"
            );
            return Ok(ExecutionOutcome::InsufficientFunds);
        }

        let handle = self
            .with_timeout(self.exchange.place_market_order(
                &pending.symbol,
                pending.side,
                self.cfg.order_size,
            ))
            .await?;
        info!(
            id = %pending.id, exchange_order = %handle.order_id,
            status = %handle.status, "market order placed"
        );

        // Offsets come from the signal price, not the just-fetched ticker.
        let order = Order::filled(
            &pending,
            self.cfg.order_size,
            self.cfg.stop_loss_pct,
            self.cfg.take_profit_pct,
        );

        if self.cfg.place_protective_orders {
            self.place_protective_orders(&order).await;
        }

        // One transaction: the order and the status flip land together.
        let transitioned = OrdersRepository::record_fill(&self.pool, &order).await?;
        if !transitioned {
            warn!(id = %pending.id, "signal was filled by a concurrent worker");
        }
        let _ = self.confirm_tx.send(order.clone());
        info!(id = %pending.id, order_id = %order.id, "trade executed and stored");

        Ok(ExecutionOutcome::Filled(order))
    }

    /// Best effort: the market order is already filled, so a failed
    /// protective leg is logged and never rolled back.
    async fn place_protective_orders(&self, order: &Order) {
        let exit = order.side.opposite();
        for (label, price) in [("stop-loss", order.stop_loss), ("take-profit", order.take_profit)]
        {
            let placed = self
                .with_timeout(self.exchange.place_limit_order(
                    &order.symbol,
                    exit,
                    order.amount,
                    price,
                ))
                .await;
            if let Err(e) = placed {
                warn!(order_id = %order.id, label, "protective order failed: {e}");
            }
        }
    }

    async fn with_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T, BotError>> + Send,
    ) -> Result<T, BotError> {
        timeout(self.cfg.exchange_timeout, fut)
            .await
            .map_err(|_| BotError::TransientIo("exchange call timed out".to_string()))?
    }
}
