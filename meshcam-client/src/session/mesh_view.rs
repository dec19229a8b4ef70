use crate::media::LocalMedia;
use crate::transport::{ConnectionState, RemoteTrack};
use meshcam_core::{PeerId, RoomId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationRole {
    Initiator,
    Responder,
}

/// Offer/answer progress of one link.
///
/// Initiators go `New → OfferSent → AnswerReceived → Stable`, responders
/// `New → OfferReceived → AnswerSent → Stable`. `Closed` is reachable from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    New,
    OfferSent,
    AnswerReceived,
    OfferReceived,
    AnswerSent,
    Stable,
    /// A negotiation step was rejected; the link waits for the next membership change.
    Failed,
    Closed,
}

impl NegotiationState {
    pub fn is_ready(&self) -> bool {
        matches!(self, NegotiationState::Stable)
    }
}

#[derive(Debug, Clone)]
pub struct PeerStatus {
    pub peer_id: PeerId,
    pub role: NegotiationRole,
    pub negotiation: NegotiationState,
    pub connection: ConnectionState,
}

impl PeerStatus {
    pub fn is_ready(&self) -> bool {
        self.negotiation.is_ready()
    }
}

/// Remote media surfaced for one participant. There is at most one entry per identity.
#[derive(Debug, Clone)]
pub struct RemoteMedia {
    pub peer_id: PeerId,
    pub tracks: Vec<RemoteTrack>,
}

/// Read-only snapshot of the session for the UI shell.
#[derive(Debug, Clone, Default)]
pub struct MeshView {
    pub local_peer: Option<PeerId>,
    pub room: Option<RoomId>,
    pub signaling_available: bool,
    pub local_media: Option<LocalMedia>,
    /// Ordered by arrival of each participant's first track.
    pub remote_media: Vec<RemoteMedia>,
    /// Sorted by identity.
    pub peers: Vec<PeerStatus>,
}

impl MeshView {
    pub fn peer(&self, peer_id: &PeerId) -> Option<&PeerStatus> {
        self.peers.iter().find(|status| &status.peer_id == peer_id)
    }

    pub fn is_ready(&self, peer_id: &PeerId) -> bool {
        self.peer(peer_id).is_some_and(PeerStatus::is_ready)
    }

    pub fn remote_media_for(&self, peer_id: &PeerId) -> Option<&RemoteMedia> {
        self.remote_media
            .iter()
            .find(|entry| &entry.peer_id == peer_id)
    }
}
