use std::sync::Arc;

use dotenvy::dotenv;
use tokio::sync::broadcast;
use tracing::info;

use common::actors::ActorType;
use common::config::BotConfig;
use common::logger;
use common::models::{Order, Signal, Tick};
use market_data::remote::BinanceClient;
use market_data::services::tick_feed::TickFeedService;
use storage::lease::{LeaseManager, MemoryLeaseManager};
use strategy::services::strategy_service::StrategyService;

use crate::actors::Supervisor;
use crate::services::execution_service::ExecutionService;

mod actors;
mod services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::setup_logger();
    dotenv().ok();

    let cfg = BotConfig::from_env()?;
    info!(
        "starting pipeline for {:?} (short={}, long={})",
        cfg.symbols, cfg.short_window, cfg.long_window
    );

    let pool = storage::db::connect(&cfg.database_url).await?;
    let exchange = Arc::new(BinanceClient::from_env(cfg.exchange_timeout)?);
    let leases: Arc<dyn LeaseManager> = Arc::new(MemoryLeaseManager::new());

    // Logical channels: raw_trades, trade_signals, trade_channel.
    let (tick_tx, _) = broadcast::channel::<Arc<Tick>>(10_000);
    let (signal_tx, _) = broadcast::channel::<Signal>(1_000);
    let (confirm_tx, _) = broadcast::channel::<Order>(1_000);

    let mut supervisor = Supervisor::new();

    let feed_symbols = cfg.symbols.clone();
    let feed_pool = pool.clone();
    let feed_tx = tick_tx.clone();
    supervisor.register_actor(
        ActorType::TickFeedActor,
        Box::new(move || {
            Box::new(TickFeedService::new(
                &feed_symbols,
                feed_pool.clone(),
                feed_tx.clone(),
            ))
        }),
    );

    let strategy_cfg = cfg.clone();
    let strategy_pool = pool.clone();
    let strategy_tick_tx = tick_tx.clone();
    let strategy_signal_tx = signal_tx.clone();
    supervisor.register_actor(
        ActorType::StrategyActor,
        Box::new(move || {
            Box::new(
                StrategyService::new(
                    &strategy_cfg,
                    strategy_pool.clone(),
                    strategy_tick_tx.subscribe(),
                    strategy_signal_tx.clone(),
                )
                .expect("window lengths were validated at startup"),
            )
        }),
    );

    let exec_cfg = cfg.clone();
    let exec_pool = pool.clone();
    let exec_exchange = exchange.clone();
    let exec_leases = leases.clone();
    let exec_signal_tx = signal_tx.clone();
    let exec_confirm_tx = confirm_tx.clone();
    supervisor.register_actor(
        ActorType::ExecutionActor,
        Box::new(move || {
            Box::new(ExecutionService::new(
                exec_cfg.clone(),
                exec_pool.clone(),
                exec_exchange.clone(),
                exec_leases.clone(),
                exec_signal_tx.subscribe(),
                exec_confirm_tx.clone(),
            ))
        }),
    );

    supervisor.start().await;
    info!("pipeline stopped");
    Ok(())
}
