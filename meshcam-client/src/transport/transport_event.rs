use crate::media::TrackKind;
use meshcam_core::{IceCandidate, PeerId};
use std::fmt;
use std::sync::Arc;
use webrtc::track::track_remote::TrackRemote;

/// Identifies one peer connection instance. The generation changes whenever the
/// link to a peer is rebuilt, so events from a replaced connection can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkId {
    pub peer_id: PeerId,
    pub generation: u64,
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.peer_id, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Media track received from a remote participant.
#[derive(Clone)]
pub struct RemoteTrack {
    pub track_id: String,
    pub stream_id: String,
    pub kind: TrackKind,
    /// RTP source, when the connection carries real media.
    pub handle: Option<Arc<TrackRemote>>,
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("track_id", &self.track_id)
            .field("stream_id", &self.stream_id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Events a peer connection reports back to the session.
#[derive(Debug)]
pub enum TransportEventKind {
    /// A local ICE candidate was gathered and must be sent to the remote peer.
    CandidateDiscovered(IceCandidate),

    /// The remote peer started sending a media track.
    TrackReceived(RemoteTrack),

    StateChanged(ConnectionState),
}

#[derive(Debug)]
pub struct TransportEvent {
    pub link: LinkId,
    pub kind: TransportEventKind,
}
