use async_trait::async_trait;
use meshcam_client::{PeerId, RoomId, SignalMessage, SignalingChannel, SignalingError, SignalingEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

#[derive(Default)]
struct RelayState {
    peers: HashMap<PeerId, mpsc::Sender<SignalingEvent>>,
    rooms: HashMap<RoomId, Vec<PeerId>>,
    membership: HashMap<PeerId, RoomId>,
}

impl RelayState {
    /// Removes `peer_id` from its room and returns the notices for the others.
    fn leave(&mut self, peer_id: &PeerId) -> Vec<(mpsc::Sender<SignalingEvent>, SignalMessage)> {
        let Some(room) = self.membership.remove(peer_id) else {
            return Vec::new();
        };

        let mut remaining = Vec::new();
        if let Some(members) = self.rooms.get_mut(&room) {
            members.retain(|id| id != peer_id);
            remaining = members.clone();
        }
        if remaining.is_empty() {
            self.rooms.remove(&room);
        }

        remaining
            .iter()
            .filter_map(|id| self.peers.get(id).cloned())
            .map(|tx| {
                (
                    tx,
                    SignalMessage::PeerLeft {
                        peer_id: peer_id.clone(),
                    },
                )
            })
            .collect()
    }
}

/// In-memory relay with the same routing rules as the WebSocket relay, for
/// running several sessions against each other inside one test.
#[derive(Clone, Default)]
pub struct LoopbackRelay {
    state: Arc<Mutex<RelayState>>,
}

impl LoopbackRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a participant and greets it with its identity.
    pub async fn connect(
        &self,
        peer_id: PeerId,
    ) -> (LoopbackChannel, mpsc::Receiver<SignalingEvent>) {
        let (tx, rx) = mpsc::channel(256);
        self.state
            .lock()
            .await
            .peers
            .insert(peer_id.clone(), tx.clone());

        let _ = tx
            .send(SignalingEvent::Message(SignalMessage::Welcome {
                peer_id: peer_id.clone(),
            }))
            .await;

        let channel = LoopbackChannel {
            peer_id,
            relay: self.clone(),
        };
        (channel, rx)
    }

    /// Simulates the participant's socket dropping.
    pub async fn drop_connection(&self, peer_id: &PeerId) {
        let (deliveries, own) = {
            let mut state = self.state.lock().await;
            let deliveries = state.leave(peer_id);
            (deliveries, state.peers.remove(peer_id))
        };
        deliver(deliveries).await;
        if let Some(tx) = own {
            let _ = tx.send(SignalingEvent::Closed).await;
        }
    }

    pub async fn members(&self, room: &RoomId) -> Vec<PeerId> {
        self.state
            .lock()
            .await
            .rooms
            .get(room)
            .cloned()
            .unwrap_or_default()
    }

    async fn route(&self, from: &PeerId, msg: SignalMessage) -> Result<(), SignalingError> {
        let deliveries = {
            let mut state = self.state.lock().await;
            if !state.peers.contains_key(from) {
                return Err(SignalingError::Disconnected);
            }

            match msg {
                SignalMessage::Join { room } => {
                    let mut deliveries = state.leave(from);
                    let members = state.rooms.entry(room.clone()).or_default();
                    let others = members.clone();
                    members.push(from.clone());
                    state.membership.insert(from.clone(), room);

                    if let Some(tx) = state.peers.get(from) {
                        deliveries.push((
                            tx.clone(),
                            SignalMessage::CurrentMembers { peers: others },
                        ));
                    }
                    deliveries
                }
                SignalMessage::Leave => state.leave(from),
                msg => match msg.peer().cloned() {
                    Some(to) => {
                        let shared = state.membership.get(from).is_some()
                            && state.membership.get(from) == state.membership.get(&to);
                        match state.peers.get(&to) {
                            Some(tx) if shared => vec![(tx.clone(), msg.readdressed(from.clone()))],
                            _ => {
                                tracing::warn!("[LoopbackRelay] dropping message for {}", to);
                                Vec::new()
                            }
                        }
                    }
                    None => Vec::new(),
                },
            }
        };

        deliver(deliveries).await;
        Ok(())
    }
}

async fn deliver(deliveries: Vec<(mpsc::Sender<SignalingEvent>, SignalMessage)>) {
    for (tx, msg) in deliveries {
        let _ = tx.send(SignalingEvent::Message(msg)).await;
    }
}

/// One participant's end of the loopback relay.
pub struct LoopbackChannel {
    peer_id: PeerId,
    relay: LoopbackRelay,
}

#[async_trait]
impl SignalingChannel for LoopbackChannel {
    async fn send(&self, msg: SignalMessage) -> Result<(), SignalingError> {
        self.relay.route(&self.peer_id, msg).await
    }

    async fn disconnect(&self) {
        self.relay.drop_connection(&self.peer_id).await;
    }
}
