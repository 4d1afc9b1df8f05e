use std::collections::HashMap;
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use common::actors::{Actor, ActorType, ControlMessage};
use common::config::{BotConfig, SamplingPolicy};
use common::error::BotError;
use common::models::{Signal, Tick};
use storage::repositories::SignalsRepository;

use crate::detector::{Evaluation, SignalDetector};
use crate::sma::SmaEngine;
use crate::window::PriceWindow;

struct SymbolPipeline {
    window: PriceWindow,
    detector: SignalDetector,
}

/// Tick -> window -> SMA -> detector -> (store, bus). One pipeline per
/// configured symbol; routing by symbol keeps each pipeline single-writer.
pub struct StrategyService {
    id: Uuid,
    engine: SmaEngine,
    sampling: SamplingPolicy,
    pipelines: HashMap<String, SymbolPipeline>,
    pool: SqlitePool,
    tick_rx: broadcast::Receiver<Arc<Tick>>,
    signal_tx: broadcast::Sender<Signal>,
}

#[async_trait]
impl Actor for StrategyService {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> ActorType {
        ActorType::StrategyActor
    }

    async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
        let heartbeat_handle = self.spawn_heartbeat(supervisor_tx.clone());

        info!(
            "Starting Strategy Engine for {} symbols",
            self.pipelines.len()
        );

        loop {
            match self.tick_rx.recv().await {
                Ok(tick) => {
                    // A failed cycle never terminates the loop.
                    if let Err(e) = self.handle_tick(&tick).await {
                        error!("signal evaluation failed: {e}");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("strategy service lagged: missed {n} ticks");
                }
                Err(_) => {
                    heartbeat_handle.abort();
                    supervisor_tx
                        .send(ControlMessage::Error(
                            self.id,
                            "tick channel closed unexpectedly".to_string(),
                        ))
                        .await?;
                    bail!("tick channel closed unexpectedly");
                }
            }
        }
    }
}

impl StrategyService {
    pub fn new(
        cfg: &BotConfig,
        pool: SqlitePool,
        tick_rx: broadcast::Receiver<Arc<Tick>>,
        signal_tx: broadcast::Sender<Signal>,
    ) -> Result<Self, BotError> {
        let engine = SmaEngine::new(cfg.short_window, cfg.long_window)?;
        let mut pipelines = HashMap::new();
        for symbol in &cfg.symbols {
            pipelines.insert(
                symbol.to_uppercase(),
                SymbolPipeline {
                    window: PriceWindow::new(cfg.long_window, cfg.ingest_mode),
                    detector: SignalDetector::new(symbol, cfg.signal_cooldown),
                },
            );
        }
        Ok(Self {
            id: Uuid::new_v4(),
            engine,
            sampling: cfg.sampling_policy,
            pipelines,
            pool,
            tick_rx,
            signal_tx,
        })
    }

    /// Runs one tick through its symbol pipeline. Returns the signal that was
    /// persisted and published by this call, if any.
    pub async fn handle_tick(&mut self, tick: &Tick) -> Result<Option<Signal>, BotError> {
        let Some(pipeline) = self.pipelines.get_mut(&tick.symbol.to_uppercase()) else {
            debug!(symbol = %tick.symbol, "tick for untracked symbol");
            return Ok(None);
        };

        pipeline.window.ingest(tick);

        let Some(points) = pipeline.window.snapshot(self.sampling) else {
            // Insufficient data is a waiting state, not a failure.
            debug!(symbol = %tick.symbol, have = pipeline.window.len(), "window not full yet");
            return Ok(None);
        };
        let Some(pair) = self.engine.compute(&points) else {
            return Ok(None);
        };
        let Some(&latest) = points.last() else {
            return Ok(None);
        };

        match pipeline.detector.evaluate(&latest, pair) {
            Evaluation::Hold | Evaluation::Suppressed { .. } => Ok(None),
            Evaluation::Emit(signal) => {
                match SignalsRepository::insert(&self.pool, &signal).await {
                    Ok(()) => {
                        // Marker advances with the insert; publish may have no
                        // subscribers yet, which is fine.
                        pipeline.detector.mark_emitted(signal.side, signal.timestamp);
                        let _ = self.signal_tx.send(signal.clone());
                        info!(
                            symbol = %signal.symbol, side = %signal.side,
                            price = signal.price, id = %signal.id,
                            "signal emitted"
                        );
                        Ok(Some(signal))
                    }
                    Err(BotError::DuplicateSignal(id)) => {
                        // Redelivered ticks regenerated a known signal.
                        debug!(%id, "duplicate signal absorbed");
                        pipeline.detector.mark_emitted(signal.side, signal.timestamp);
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }
}
