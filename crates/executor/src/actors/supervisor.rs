use std::{collections::HashMap, time::Duration};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{error, info, warn};
use uuid::Uuid;

use common::actors::{Actor, ActorType, ControlMessage};

type ActorFactory = Box<dyn Fn() -> Box<dyn Actor> + Send + Sync>;

/// Restarts actors that stop heartbeating and tears everything down on
/// Ctrl-C. Actors are restarted from their registered factory, so a crashed
/// service loses only its in-memory window state, never persisted signals.
pub struct Supervisor {
    actor_factories: HashMap<ActorType, ActorFactory>,
    pulses: HashMap<ActorType, Instant>,
    ids: HashMap<Uuid, ActorType>,
    handles: HashMap<ActorType, JoinHandle<()>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            actor_factories: HashMap::new(),
            pulses: HashMap::new(),
            ids: HashMap::new(),
            handles: HashMap::new(),
        }
    }

    pub fn register_actor(&mut self, actor_type: ActorType, factory: ActorFactory) {
        self.actor_factories.insert(actor_type, factory);
    }

    pub async fn start(&mut self) {
        let mut check_interval = time::interval(Duration::from_secs(1));
        let timeout_duration = Duration::from_secs(3);

        let (supervisor_tx, mut supervisor_rx) = mpsc::channel::<ControlMessage>(512);

        let actors: Vec<ActorType> = self.actor_factories.keys().copied().collect();
        for actor in actors {
            self.spawn_actor(actor, supervisor_tx.clone());
        }

        loop {
            tokio::select! {
                Some(msg) = supervisor_rx.recv() => {
                    match msg {
                        ControlMessage::Heartbeat(id) => {
                            if let Some(actor_type) = self.ids.get(&id).copied() {
                                self.pulses.insert(actor_type, Instant::now());
                            }
                        }
                        ControlMessage::Shutdown(id) => {
                            if let Some(actor_type) = self.ids.remove(&id) {
                                warn!("{actor_type:?} is shutting down gracefully.");
                                self.pulses.remove(&actor_type);
                                if let Some(handle) = self.handles.remove(&actor_type) {
                                    handle.abort();
                                }
                            }
                        }
                        ControlMessage::Error(id, error_msg) => {
                            if let Some(actor_type) = self.ids.get(&id).copied() {
                                error!("actor {actor_type:?} reported error: {error_msg}");
                                self.pulses.insert(actor_type, Instant::now());
                            }
                        }
                    }
                }

                _ = check_interval.tick() => {
                    let dead_actors: Vec<ActorType> = self
                        .pulses
                        .iter()
                        .filter(|(_, pulse)| pulse.elapsed() > timeout_duration)
                        .map(|(&actor_type, _)| actor_type)
                        .collect();

                    for actor_type in dead_actors {
                        warn!("{actor_type:?} is unresponsive, restarting");
                        if let Some(handle) = self.handles.remove(&actor_type) {
                            handle.abort();
                        }
                        self.spawn_actor(actor_type, supervisor_tx.clone());
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested, stopping all actors");
                    for (_, handle) in self.handles.drain() {
                        handle.abort();
                    }
                    break;
                }
            }
        }
    }

    fn spawn_actor(&mut self, actor_type: ActorType, tx: mpsc::Sender<ControlMessage>) {
        let mut new_actor = self.actor_factories[&actor_type]();
        // Heartbeats from a replaced incarnation must not count.
        self.ids.retain(|_, t| *t != actor_type);
        self.ids.insert(new_actor.id(), actor_type);
        let handle = tokio::spawn(async move {
            if let Err(e) = new_actor.run(tx).await {
                error!("actor {actor_type:?} crashed: {e}");
            }
        });
        self.handles.insert(actor_type, handle);
        self.pulses.insert(actor_type, Instant::now());
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
