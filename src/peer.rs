use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// A connected client, as seen by the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    pub id: Uuid,
    pub address: SocketAddr,
}

#[derive(Debug)]
enum Event {
    Add(Peer),
    Remove(Uuid),
    Count(oneshot::Sender<usize>),
}

/// Handle to the registry of live peers.
///
/// The set of peers is owned by a single task; handles only send it events, so the set needs no
/// lock. The task exits once every handle has been dropped.
#[derive(Clone)]
pub struct Registry {
    tx: mpsc::UnboundedSender<Event>,
}

impl Registry {
    pub fn spawn() -> (Registry, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(rx));

        (Registry { tx }, handle)
    }

    pub fn add(&self, peer: Peer) {
        // A send only fails once the registry task is gone, at which point nobody is listening.
        let _ = self.tx.send(Event::Add(peer));
    }

    pub fn remove(&self, id: Uuid) {
        let _ = self.tx.send(Event::Remove(id));
    }

    /// Number of registered peers. Zero if the registry task has stopped.
    pub async fn count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Event::Count(tx)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Event>) {
    let mut peers: HashMap<Uuid, Peer> = HashMap::new();

    while let Some(event) = rx.recv().await {
        match event {
            Event::Add(peer) => {
                let (id, address) = (peer.id, peer.address);
                peers.insert(id, peer);
                info!(peer_id = %id, %address, active = peers.len(), "peer registered");
            }
            Event::Remove(id) => {
                if let Some(peer) = peers.remove(&id) {
                    info!(
                        peer_id = %peer.id,
                        address = %peer.address,
                        active = peers.len(),
                        "peer deregistered"
                    );
                }
            }
            Event::Count(reply) => {
                let _ = reply.send(peers.len());
            }
        }
    }

    debug!("peer registry stopped");
}
