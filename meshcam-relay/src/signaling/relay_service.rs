use crate::config::RelayConfig;
use crate::room::RoomRegistry;
use axum::extract::ws::Message;
use dashmap::DashMap;
use meshcam_core::{IceServerConfig, PeerId, SignalMessage};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

struct RelayInner {
    peers: DashMap<PeerId, mpsc::UnboundedSender<Message>>,
    rooms: Mutex<RoomRegistry>,
    ice_servers: Vec<IceServerConfig>,
}

/// Holds every connected participant and routes signaling between them.
#[derive(Clone)]
pub struct RelayService {
    inner: Arc<RelayInner>,
}

impl RelayService {
    pub fn new(ice_servers: Vec<IceServerConfig>) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                peers: DashMap::new(),
                rooms: Mutex::new(RoomRegistry::new()),
                ice_servers,
            }),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.ice_servers.clone())
    }

    pub fn get_ice_servers(&self) -> Vec<IceServerConfig> {
        self.inner.ice_servers.clone()
    }

    /// Registers a connection and greets it with its identity and ICE servers.
    pub fn add_peer(&self, peer_id: PeerId, tx: mpsc::UnboundedSender<Message>) {
        self.inner.peers.insert(peer_id.clone(), tx);

        self.send_signal(
            &peer_id,
            SignalMessage::Welcome {
                peer_id: peer_id.clone(),
            },
        );
        self.send_signal(
            &peer_id,
            SignalMessage::IceConfig {
                ice_servers: self.get_ice_servers(),
            },
        );
    }

    /// Drops the connection, leaving its room first.
    pub async fn remove_peer(&self, peer_id: &PeerId) {
        self.leave(peer_id).await;
        self.inner.peers.remove(peer_id);
    }

    pub fn peer_count(&self) -> usize {
        self.inner.peers.len()
    }

    pub fn send_signal(&self, peer_id: &PeerId, msg: SignalMessage) {
        if let Some(peer) = self.inner.peers.get(peer_id) {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if let Err(e) = peer.send(Message::Text(json.into())) {
                        error!("Failed to send WS message to {}: {:?}", peer_id, e);
                    }
                }
                Err(e) => error!("Failed to serialize signal message: {}", e),
            }
        } else {
            warn!("Attempted to send signal to disconnected user {}", peer_id);
        }
    }

    /// Handles one message received from `from`.
    pub async fn handle_signal(&self, from: &PeerId, msg: SignalMessage) {
        match msg {
            SignalMessage::Join { room } => {
                info!("Peer {} joins room '{}'", from, room);

                let outcome = self.inner.rooms.lock().await.join(from, room);
                if let Some(departure) = outcome.left {
                    self.announce_departure(from, &departure.remaining);
                }
                self.send_signal(
                    from,
                    SignalMessage::CurrentMembers {
                        peers: outcome.existing,
                    },
                );
            }

            SignalMessage::Leave => self.leave(from).await,

            SignalMessage::Offer { .. }
            | SignalMessage::Answer { .. }
            | SignalMessage::IceCandidate { .. } => self.forward(from, msg).await,

            other => warn!("Unexpected message from {}: {:?}", from, other),
        }
    }

    async fn leave(&self, peer_id: &PeerId) {
        let departure = self.inner.rooms.lock().await.leave(peer_id);
        if let Some(departure) = departure {
            info!("Peer {} left room '{}'", peer_id, departure.room);
            self.announce_departure(peer_id, &departure.remaining);
        }
    }

    fn announce_departure(&self, peer_id: &PeerId, remaining: &[PeerId]) {
        for member in remaining {
            self.send_signal(
                member,
                SignalMessage::PeerLeft {
                    peer_id: peer_id.clone(),
                },
            );
        }
    }

    /// Delivers a peer-to-peer message with its address rewritten to the sender.
    async fn forward(&self, from: &PeerId, msg: SignalMessage) {
        let Some(to) = msg.peer().cloned() else {
            return;
        };

        if !self.inner.rooms.lock().await.share_room(from, &to) {
            warn!("Dropping message from {} to {}: not in the same room", from, to);
            return;
        }

        debug!("Forwarding signal {} -> {}", from, to);
        self.send_signal(&to, msg.readdressed(from.clone()));
    }
}
