use std::time::Duration;

use async_trait::async_trait;
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorType {
    TickFeedActor,
    StrategyActor,
    ExecutionActor,
}

/// Messages sent from actors to the supervisor.
#[derive(Debug)]
pub enum ControlMessage {
    Heartbeat(Uuid),
    Shutdown(Uuid),
    Error(Uuid, String),
}

/// The trait every restartable service implements.
#[async_trait]
pub trait Actor: Send + Sync {
    fn name(&self) -> ActorType;

    fn id(&self) -> Uuid;

    /// The main loop of the actor. It must periodically send
    /// `ControlMessage::Heartbeat` to the supervisor.
    async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()>;

    fn spawn_heartbeat(&self, supervisor_tx: mpsc::Sender<ControlMessage>) -> JoinHandle<()> {
        let id = self.id();
        tokio::spawn(async move {
            loop {
                if supervisor_tx
                    .send(ControlMessage::Heartbeat(id))
                    .await
                    .is_err()
                {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        })
    }
}
