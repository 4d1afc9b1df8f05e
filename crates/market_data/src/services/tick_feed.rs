use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use sqlx::SqlitePool;
use tokio::{
    sync::{broadcast, mpsc},
    time,
};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use common::actors::{Actor, ActorType, ControlMessage};
use common::models::Tick;
use storage::repositories::TradesRepository;

use crate::remote::{CombinedStreamEvent, TradeEvent, get_ws_base_url};

/// Streams `<symbol>@trade` events from the exchange websocket, publishes
/// every tick on the raw-trades channel and batches them into the store.
/// Reconnect policy lives here; downstream only ever sees clean ticks.
pub struct TickFeedService {
    id: Uuid,
    symbols: Vec<String>,
    pool: SqlitePool,
    tick_tx: broadcast::Sender<Arc<Tick>>,
}

#[async_trait]
impl Actor for TickFeedService {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> ActorType {
        ActorType::TickFeedActor
    }

    async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
        let heartbeat_handle = self.spawn_heartbeat(supervisor_tx.clone());

        let streams: Vec<String> = self
            .symbols
            .iter()
            .map(|s| format!("{}@trade", s.to_lowercase()))
            .collect();
        let url = format!("{}{}", get_ws_base_url(), streams.join("/"));

        let (db_tx, db_rx) = mpsc::channel(2000);
        tokio::spawn(Self::db_writer(self.pool.clone(), db_rx));

        info!("Connecting to: {url}");

        loop {
            match tokio_tungstenite::connect_async(&url).await {
                Ok((ws_stream, _)) => {
                    let (mut write, mut read) = ws_stream.split();

                    info!("feed connected for {} symbols", self.symbols.len());

                    while let Some(msg) = read.next().await {
                        match msg {
                            Ok(Message::Text(ref text)) => match Self::parse_tick(text) {
                                Ok(tick) => {
                                    if db_tx.send(tick.clone()).await.is_err() {
                                        warn!("tick recorder stopped, dropping persistence");
                                    }
                                    let _ = self.tick_tx.send(Arc::new(tick));
                                }
                                Err(e) => {
                                    let report = supervisor_tx
                                        .send(ControlMessage::Error(
                                            self.id,
                                            format!("unparseable feed frame: {e}"),
                                        ))
                                        .await;
                                    if report.is_err() {
                                        heartbeat_handle.abort();
                                        anyhow::bail!("supervisor channel closed");
                                    }
                                    continue;
                                }
                            },
                            Ok(Message::Ping(pg)) => {
                                let _ = write.send(Message::Pong(pg)).await;
                                continue;
                            }
                            Ok(Message::Close(_)) => {
                                debug!("close frame received");
                                break;
                            }
                            Err(e) => {
                                error!("websocket error: {e}");
                                break;
                            }
                            _ => continue,
                        }
                    }
                }
                Err(e) => {
                    error!("connection failed: {e}. Retrying in 2s...");
                    let report = supervisor_tx
                        .send(ControlMessage::Error(
                            self.id,
                            format!("connection failed: {e}"),
                        ))
                        .await;
                    if report.is_err() {
                        heartbeat_handle.abort();
                        anyhow::bail!("supervisor channel closed");
                    }
                }
            }
            // Reconnect after either a dropped socket or a failed dial.
            time::sleep(Duration::from_secs(2)).await;
        }
    }
}

impl TickFeedService {
    pub fn new(
        symbols: &[String],
        pool: SqlitePool,
        tick_tx: broadcast::Sender<Arc<Tick>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbols: symbols.to_vec(),
            pool,
            tick_tx,
        }
    }

    fn parse_tick(json_input: &str) -> Result<Tick, anyhow::Error> {
        let frame: CombinedStreamEvent = serde_json::from_str(json_input)?;
        if !frame.stream.ends_with("@trade") {
            anyhow::bail!("unexpected stream '{}'", frame.stream);
        }
        let event: TradeEvent = serde_json::from_value(frame.data)?;
        Ok(event.to_tick()?)
    }

    async fn db_writer(pool: SqlitePool, mut tick_rx: mpsc::Receiver<Tick>) {
        let mut buffer: Vec<Tick> = Vec::with_capacity(600);
        let mut last_flush = Instant::now();

        loop {
            tokio::select! {
                result = tick_rx.recv() => {
                    match result {
                        Some(tick) => {
                            buffer.push(tick);
                            if buffer.len() >= 500 || last_flush.elapsed() >= Duration::from_secs(10) {
                                Self::flush_batch(&pool, &buffer).await;
                                buffer.clear();
                                last_flush = Instant::now();
                            }
                        }
                        None => {
                            info!("tick channel closed, flushing remaining buffer");
                            if !buffer.is_empty() {
                                Self::flush_batch(&pool, &buffer).await;
                            }
                            break;
                        }
                    }
                }

                _ = time::sleep(Duration::from_secs(2)) => {
                    if !buffer.is_empty() {
                        Self::flush_batch(&pool, &buffer).await;
                        buffer.clear();
                        last_flush = Instant::now();
                    }
                }
            }
        }
    }

    async fn flush_batch(pool: &SqlitePool, batch: &[Tick]) {
        if let Err(e) = TradesRepository::insert_batch(pool, batch).await {
            error!("tick batch write failed: {e}");
        } else {
            debug!("wrote {} ticks", batch.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_trade_streams() {
        let frame = r#"{"stream": "btcusdt@depth20@100ms", "data": {}}"#;
        assert!(TickFeedService::parse_tick(frame).is_err());
    }

    #[test]
    fn parses_a_trade_frame_into_a_tick() {
        let frame = r#"{
            "stream": "btcusdt@trade",
            "data": {"s": "BTCUSDT", "p": "97000.5", "q": "0.001", "T": 1739361600000}
        }"#;
        let tick = TickFeedService::parse_tick(frame).unwrap();
        assert_eq!(tick.symbol, "BTCUSDT");
        assert_eq!(tick.price, 97_000.5);
    }
}
