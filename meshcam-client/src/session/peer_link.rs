use crate::media::LocalMedia;
use crate::session::negotiator::{LinkCommand, LinkProgress, Negotiator};
use crate::session::{NegotiationRole, NegotiationState, PeerStatus};
use crate::signaling::SignalingChannel;
use crate::transport::{ConnectionState, LinkId, PeerConnection, RemoteTrack};
use meshcam_core::IceCandidate;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// The session's record of one remote participant.
pub(crate) struct PeerLink {
    pub(crate) id: LinkId,
    pub(crate) role: NegotiationRole,
    pub(crate) state: NegotiationState,
    pub(crate) connection_state: ConnectionState,
    pub(crate) remote_tracks: Vec<RemoteTrack>,
    /// Remote candidates received while our offer was unanswered, kept so they can
    /// be replayed if this link yields to the remote offer.
    pub(crate) held_candidates: Vec<IceCandidate>,
    connection: Arc<dyn PeerConnection>,
    commands: mpsc::UnboundedSender<LinkCommand>,
    closed: Arc<AtomicBool>,
}

impl PeerLink {
    /// Wraps a fresh connection and starts its negotiation worker.
    pub(crate) fn spawn(
        id: LinkId,
        role: NegotiationRole,
        connection: Arc<dyn PeerConnection>,
        signaling: Arc<dyn SignalingChannel>,
        media: Option<LocalMedia>,
        max_pending_candidates: usize,
        progress_tx: mpsc::Sender<LinkProgress>,
    ) -> Self {
        let closed = Arc::new(AtomicBool::new(false));
        let (commands, command_rx) = mpsc::unbounded_channel();

        let negotiator = Negotiator::new(
            id.clone(),
            role,
            connection.clone(),
            signaling,
            media,
            max_pending_candidates,
            closed.clone(),
            progress_tx,
        );
        tokio::spawn(negotiator.run(command_rx));

        Self {
            id,
            role,
            state: NegotiationState::New,
            connection_state: ConnectionState::New,
            remote_tracks: Vec::new(),
            held_candidates: Vec::new(),
            connection,
            commands,
            closed,
        }
    }

    pub(crate) fn dispatch(&self, cmd: LinkCommand) {
        if self.commands.send(cmd).is_err() {
            debug!("Negotiator for {} is gone, dropping command", self.id);
        }
    }

    /// Whether our offer is still waiting for an answer.
    pub(crate) fn awaiting_answer(&self) -> bool {
        self.role == NegotiationRole::Initiator
            && matches!(
                self.state,
                NegotiationState::New | NegotiationState::OfferSent
            )
    }

    /// Returns false when the track was already known.
    pub(crate) fn record_track(&mut self, track: RemoteTrack) -> bool {
        if self
            .remote_tracks
            .iter()
            .any(|known| known.track_id == track.track_id)
        {
            return false;
        }
        self.remote_tracks.push(track);
        true
    }

    pub(crate) fn status(&self) -> PeerStatus {
        PeerStatus {
            peer_id: self.id.peer_id.clone(),
            role: self.role,
            negotiation: self.state,
            connection: self.connection_state,
        }
    }

    /// Closes the connection. Any step still in flight completes as a no-op.
    pub(crate) async fn close(self) {
        self.closed.store(true, Ordering::Release);
        drop(self.commands);

        if let Err(e) = self.connection.close().await {
            warn!("Failed to close connection {}: {:?}", self.id, e);
        }
    }
}
