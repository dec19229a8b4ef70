use crate::model::peer::PeerId;
use crate::model::room::RoomId;
use crate::model::session::IceCandidate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Every frame exchanged with the relay.
///
/// For `Offer`, `Answer` and `IceCandidate`, `peer_id` names the addressee on the way
/// to the relay and is rewritten by the relay to the sender on delivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", content = "d")]
pub enum SignalMessage {
    Welcome {
        peer_id: PeerId,
    },
    IceConfig {
        ice_servers: Vec<IceServerConfig>,
    },
    Join {
        room: RoomId,
    },
    Leave,
    CurrentMembers {
        peers: Vec<PeerId>,
    },
    PeerLeft {
        peer_id: PeerId,
    },
    Offer {
        peer_id: PeerId,
        sdp: String,
    },
    Answer {
        peer_id: PeerId,
        sdp: String,
    },
    IceCandidate {
        peer_id: PeerId,
        candidate: IceCandidate,
    },
}

impl SignalMessage {
    /// Remote identity carried by peer-to-peer messages.
    pub fn peer(&self) -> Option<&PeerId> {
        match self {
            SignalMessage::Offer { peer_id, .. }
            | SignalMessage::Answer { peer_id, .. }
            | SignalMessage::IceCandidate { peer_id, .. } => Some(peer_id),
            _ => None,
        }
    }

    /// Same message with the peer-to-peer identity replaced, as the relay forwards it.
    pub fn readdressed(self, peer: PeerId) -> Self {
        match self {
            SignalMessage::Offer { sdp, .. } => SignalMessage::Offer { peer_id: peer, sdp },
            SignalMessage::Answer { sdp, .. } => SignalMessage::Answer { peer_id: peer, sdp },
            SignalMessage::IceCandidate { candidate, .. } => SignalMessage::IceCandidate {
                peer_id: peer,
                candidate,
            },
            other => other,
        }
    }
}
