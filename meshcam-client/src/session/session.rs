use crate::config::MeshConfig;
use crate::error::{MeshError, Result};
use crate::media::{LocalMedia, MediaSource};
use crate::session::negotiator::{LinkCommand, LinkProgress};
use crate::session::peer_link::PeerLink;
use crate::session::session_command::SessionCommand;
use crate::session::{
    MeshView, NegotiationRole, PeerStatus, RemoteMedia, SessionHandle,
};
use crate::signaling::{SignalingChannel, SignalingEvent, WsSignalingChannel};
use crate::transport::{LinkId, PeerConnector, TransportEvent, TransportEventKind};
use meshcam_core::{IceCandidate, IceServerConfig, PeerId, RoomId, SignalMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// The mesh coordinator actor.
///
/// Owns the signaling handle, the peer table and the local media. All state
/// changes happen on its event loop; negotiation steps run on per-link workers.
pub struct MeshSession {
    config: MeshConfig,
    signaling: Arc<dyn SignalingChannel>,
    media_source: Arc<dyn MediaSource>,
    connector: Arc<dyn PeerConnector>,

    local_peer: Option<PeerId>,
    room: Option<RoomId>,
    local_media: Option<LocalMedia>,
    ice_servers: Vec<IceServerConfig>,
    signaling_available: bool,

    /// At most one link per remote identity.
    links: HashMap<PeerId, PeerLink>,

    /// Candidates from peers we have no link for yet (they overtook the offer).
    early_candidates: HashMap<PeerId, Vec<IceCandidate>>,

    /// Joins sent whose member list has not come back yet. Peer signals read
    /// while this is non-zero were sent to an earlier room.
    pending_joins: usize,

    /// Peers in the order their first remote track arrived.
    remote_order: Vec<PeerId>,
    next_generation: u64,

    command_rx: mpsc::Receiver<SessionCommand>,
    signal_rx: mpsc::Receiver<SignalingEvent>,
    signal_open: bool,
    transport_rx: mpsc::Receiver<TransportEvent>,
    transport_tx: mpsc::Sender<TransportEvent>,
    progress_rx: mpsc::Receiver<LinkProgress>,
    progress_tx: mpsc::Sender<LinkProgress>,
    view_tx: watch::Sender<MeshView>,
}

impl MeshSession {
    /// Starts the session actor on the current runtime.
    ///
    /// `signal_rx` is the inbound half of `signaling`.
    pub fn spawn(
        config: MeshConfig,
        signaling: Arc<dyn SignalingChannel>,
        signal_rx: mpsc::Receiver<SignalingEvent>,
        media_source: Arc<dyn MediaSource>,
        connector: Arc<dyn PeerConnector>,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer);
        let (view_tx, view_rx) = watch::channel(MeshView {
            signaling_available: true,
            ..Default::default()
        });
        let (transport_tx, transport_rx) = mpsc::channel(config.event_buffer);
        let (progress_tx, progress_rx) = mpsc::channel(config.event_buffer);

        let session = Self {
            ice_servers: config.ice_servers.clone(),
            config,
            signaling,
            media_source,
            connector,
            local_peer: None,
            room: None,
            local_media: None,
            signaling_available: true,
            links: HashMap::new(),
            early_candidates: HashMap::new(),
            pending_joins: 0,
            remote_order: Vec::new(),
            next_generation: 0,
            command_rx,
            signal_rx,
            signal_open: true,
            transport_rx,
            transport_tx,
            progress_rx,
            progress_tx,
            view_tx,
        };
        tokio::spawn(session.run());

        SessionHandle::new(command_tx, view_rx)
    }

    /// Connects to the relay at `config.signaling_url` and starts the session.
    pub async fn connect(
        config: MeshConfig,
        media_source: Arc<dyn MediaSource>,
        connector: Arc<dyn PeerConnector>,
    ) -> anyhow::Result<SessionHandle> {
        let (signal_tx, signal_rx) = mpsc::channel(config.event_buffer);
        let channel = WsSignalingChannel::connect(&config.signaling_url, signal_tx).await?;

        Ok(Self::spawn(
            config,
            Arc::new(channel),
            signal_rx,
            media_source,
            connector,
        ))
    }

    async fn run(mut self) {
        info!("Mesh session started");

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Teardown { reply }) => {
                            self.teardown().await;
                            let _ = reply.send(());
                            break;
                        }
                        Some(c) => self.handle_command(c).await,
                        None => {
                            info!("All session handles dropped. Tearing down.");
                            self.teardown().await;
                            break;
                        }
                    }
                }

                evt = self.signal_rx.recv(), if self.signal_open => {
                    match evt {
                        Some(SignalingEvent::Message(msg)) => self.handle_signal(msg).await,
                        Some(SignalingEvent::Closed) => self.on_signaling_closed(),
                        None => {
                            self.signal_open = false;
                            self.on_signaling_closed();
                        }
                    }
                }

                Some(evt) = self.transport_rx.recv() => self.handle_transport_event(evt).await,

                Some(progress) = self.progress_rx.recv() => self.handle_progress(progress),
            }
        }

        info!("Mesh session finished");
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::StartLocalMedia { reply } => {
                let _ = reply.send(self.start_local_media().await);
            }
            SessionCommand::JoinRoom { room, reply } => {
                let _ = reply.send(self.join_room(room).await);
            }
            SessionCommand::LeaveRoom { reply } => {
                let _ = reply.send(self.leave_room().await);
            }
            SessionCommand::Teardown { reply } => {
                self.teardown().await;
                let _ = reply.send(());
            }
        }
    }

    async fn start_local_media(&mut self) -> Result<LocalMedia> {
        if let Some(media) = &self.local_media {
            return Ok(media.clone());
        }

        let media = self.media_source.acquire().await.map_err(|e| {
            warn!("Failed to start local media: {}", e);
            MeshError::Media(e)
        })?;
        info!("Local media started: {}", media.stream_id());

        self.local_media = Some(media.clone());
        self.publish();
        Ok(media)
    }

    async fn join_room(&mut self, room: RoomId) -> Result<()> {
        if self.local_media.is_none() {
            warn!("Refusing to join {} before local media is started", room);
            return Err(MeshError::MediaNotStarted);
        }

        if self.room.as_ref() == Some(&room) {
            debug!("Already in room {}", room);
            return Ok(());
        }

        if self.room.is_some() {
            self.leave_room().await?;
        }

        self.signaling
            .send(SignalMessage::Join { room: room.clone() })
            .await?;
        self.pending_joins += 1;
        info!("Joined room {}", room);

        self.room = Some(room);
        self.publish();
        Ok(())
    }

    async fn leave_room(&mut self) -> Result<()> {
        let Some(room) = self.room.take() else {
            return Ok(());
        };

        info!("Leaving room {}", room);
        if let Err(e) = self.signaling.send(SignalMessage::Leave).await {
            warn!("Failed to notify relay about leaving {}: {}", room, e);
        }

        self.close_all_links().await;
        self.early_candidates.clear();
        self.publish();
        Ok(())
    }

    async fn teardown(&mut self) {
        info!("Tearing down mesh session");

        let _ = self.leave_room().await;
        self.close_all_links().await;

        if let Some(media) = self.local_media.take() {
            self.media_source.release(&media).await;
        }

        self.signaling.disconnect().await;
        self.signaling_available = false;
        self.publish();
    }

    async fn handle_signal(&mut self, msg: SignalMessage) {
        if !self.signaling_available {
            info!("Signaling channel available again");
            self.signaling_available = true;
            self.publish();
        }

        match msg {
            SignalMessage::Welcome { peer_id } => {
                info!("Relay assigned local identity {}", peer_id);
                self.local_peer = Some(peer_id);
                self.publish();
            }

            SignalMessage::IceConfig { ice_servers } => {
                if ice_servers.is_empty() {
                    debug!("Relay sent empty ICE config, keeping {} servers", self.ice_servers.len());
                } else {
                    info!("Received ICE config: {} servers", ice_servers.len());
                    self.ice_servers = ice_servers;
                }
            }

            SignalMessage::CurrentMembers { peers } => self.on_current_members(peers).await,

            SignalMessage::PeerLeft { peer_id } => self.on_peer_left(peer_id).await,

            SignalMessage::Offer { peer_id, .. }
            | SignalMessage::Answer { peer_id, .. }
            | SignalMessage::IceCandidate { peer_id, .. }
                if self.pending_joins > 0 =>
            {
                debug!("Dropping signal from {} sent before our last join", peer_id);
            }

            SignalMessage::Offer { peer_id, sdp } => self.on_remote_offer(peer_id, sdp).await,

            SignalMessage::Answer { peer_id, sdp } => self.on_remote_answer(peer_id, sdp),

            SignalMessage::IceCandidate { peer_id, candidate } => {
                self.on_remote_candidate(peer_id, candidate)
            }

            other => warn!("Unexpected message from relay: {:?}", other),
        }
    }

    /// The joiner initiates toward every member that was already in the room.
    async fn on_current_members(&mut self, peers: Vec<PeerId>) {
        if self.pending_joins == 0 {
            warn!("Ignoring member list we did not ask for");
            return;
        }
        self.pending_joins -= 1;
        if self.pending_joins > 0 {
            debug!("Dropping member list of an earlier join");
            return;
        }

        if self.room.is_none() {
            debug!("Ignoring member list while not in a room");
            return;
        }

        // Anything parked so far came from a previous membership.
        self.early_candidates.clear();

        info!("Room has {} existing members", peers.len());
        for peer_id in peers {
            if self.local_peer.as_ref() == Some(&peer_id) || self.links.contains_key(&peer_id) {
                continue;
            }
            if self
                .create_link(peer_id.clone(), NegotiationRole::Initiator)
                .await
            {
                self.dispatch(&peer_id, LinkCommand::Initiate);
            }
        }
        self.publish();
    }

    async fn on_peer_left(&mut self, peer_id: PeerId) {
        if self.room.is_none() {
            return;
        }

        self.early_candidates.remove(&peer_id);

        if self.remove_link(&peer_id).await {
            info!("Peer {} left, link closed", peer_id);
            self.publish();
        } else {
            debug!("Peer {} left without a link", peer_id);
        }
    }

    async fn on_remote_offer(&mut self, from: PeerId, sdp: String) {
        if self.room.is_none() {
            debug!("Dropping offer from {}", from);
            return;
        }

        if let Some(link) = self.links.get(&from) {
            if link.role == NegotiationRole::Responder {
                link.dispatch(LinkCommand::RemoteOffer(sdp));
                return;
            }
            if !link.awaiting_answer() {
                debug!("Dropping renegotiation offer from {}", from);
                return;
            }

            // Both sides initiated. The greater identity keeps its offer.
            let Some(local) = self.local_peer.as_ref() else {
                warn!(
                    "Offer glare with {} before the relay assigned our identity, ignoring remote offer",
                    from
                );
                return;
            };
            if *local > from {
                info!("Offer glare with {}: keeping our offer", from);
                return;
            }

            info!("Offer glare with {}: answering the remote offer instead", from);
            let held = self
                .links
                .get_mut(&from)
                .map(|link| std::mem::take(&mut link.held_candidates))
                .unwrap_or_default();
            self.remove_link(&from).await;
            if !held.is_empty() {
                self.early_candidates.insert(from.clone(), held);
            }
        }

        if self
            .create_link(from.clone(), NegotiationRole::Responder)
            .await
        {
            self.dispatch(&from, LinkCommand::RemoteOffer(sdp));
        }
        self.publish();
    }

    fn on_remote_answer(&mut self, from: PeerId, sdp: String) {
        match self.links.get(&from) {
            Some(link) => link.dispatch(LinkCommand::RemoteAnswer(sdp)),
            None => debug!("Dropping answer from {}: no link", from),
        }
    }

    fn on_remote_candidate(&mut self, from: PeerId, candidate: IceCandidate) {
        if self.room.is_none() {
            debug!("Dropping ICE candidate from {}", from);
            return;
        }

        let max_pending = self.config.max_pending_candidates;

        if let Some(link) = self.links.get_mut(&from) {
            if link.awaiting_answer() && link.held_candidates.len() < max_pending {
                link.held_candidates.push(candidate.clone());
            }
            link.dispatch(LinkCommand::RemoteCandidate(candidate));
            return;
        }

        if !self.early_candidates.contains_key(&from)
            && self.early_candidates.len() >= self.config.max_early_peers
        {
            warn!("Too many peers with early ICE candidates, dropping one from {}", from);
            return;
        }
        let queue = self.early_candidates.entry(from.clone()).or_default();
        if queue.len() >= max_pending {
            warn!("Too many early ICE candidates from {}, dropping one", from);
            return;
        }
        queue.push(candidate);
    }

    fn on_signaling_closed(&mut self) {
        if !self.signaling_available {
            return;
        }
        warn!("Signaling channel unavailable. Keeping {} links.", self.links.len());
        self.signaling_available = false;
        self.publish();
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        let TransportEvent { link, kind } = event;

        let Some(peer_link) = self
            .links
            .get_mut(&link.peer_id)
            .filter(|peer_link| peer_link.id == link)
        else {
            debug!("Dropping event from stale connection {}", link);
            return;
        };

        match kind {
            TransportEventKind::CandidateDiscovered(candidate) => {
                let msg = SignalMessage::IceCandidate {
                    peer_id: link.peer_id.clone(),
                    candidate,
                };
                if let Err(e) = self.signaling.send(msg).await {
                    warn!("Failed to forward ICE candidate to {}: {}", link, e);
                }
            }

            TransportEventKind::TrackReceived(track) => {
                let first = peer_link.remote_tracks.is_empty();
                if !peer_link.record_track(track) {
                    debug!("Duplicate track event from {}", link);
                    return;
                }
                if first {
                    info!("Receiving media from {}", link.peer_id);
                    self.remote_order.push(link.peer_id.clone());
                }
                self.publish();
            }

            TransportEventKind::StateChanged(state) => {
                peer_link.connection_state = state;
                self.publish();
            }
        }
    }

    fn handle_progress(&mut self, progress: LinkProgress) {
        let Some(link) = self
            .links
            .get_mut(&progress.link.peer_id)
            .filter(|link| link.id == progress.link)
        else {
            return;
        };

        debug!("Link {} is now {:?}", link.id, progress.state);
        link.state = progress.state;
        if !link.awaiting_answer() {
            link.held_candidates.clear();
        }
        self.publish();
    }

    /// Creates a link and its connection. Returns false if the connection
    /// could not be created.
    async fn create_link(&mut self, peer_id: PeerId, role: NegotiationRole) -> bool {
        self.next_generation += 1;
        let id = LinkId {
            peer_id: peer_id.clone(),
            generation: self.next_generation,
        };

        let connection = match self
            .connector
            .connect(id.clone(), &self.ice_servers, self.transport_tx.clone())
            .await
        {
            Ok(connection) => connection,
            Err(e) => {
                error!("Failed to create connection for {}: {:?}", id, e);
                return false;
            }
        };

        info!("Created {:?} link {}", role, id);
        let link = PeerLink::spawn(
            id,
            role,
            connection,
            self.signaling.clone(),
            self.local_media.clone(),
            self.config.max_pending_candidates,
            self.progress_tx.clone(),
        );

        for candidate in self.early_candidates.remove(&peer_id).unwrap_or_default() {
            link.dispatch(LinkCommand::RemoteCandidate(candidate));
        }

        self.links.insert(peer_id, link);
        true
    }

    fn dispatch(&self, peer_id: &PeerId, cmd: LinkCommand) {
        if let Some(link) = self.links.get(peer_id) {
            link.dispatch(cmd);
        }
    }

    /// Closes and forgets the link to `peer_id`. Returns whether one existed.
    async fn remove_link(&mut self, peer_id: &PeerId) -> bool {
        self.remote_order.retain(|id| id != peer_id);

        let Some(link) = self.links.remove(peer_id) else {
            return false;
        };
        link.close().await;
        true
    }

    async fn close_all_links(&mut self) {
        self.remote_order.clear();

        let links: Vec<PeerLink> = self.links.drain().map(|(_, link)| link).collect();
        for link in links {
            link.close().await;
        }
    }

    fn publish(&self) {
        let mut peers: Vec<PeerStatus> = self.links.values().map(PeerLink::status).collect();
        peers.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));

        let remote_media = self
            .remote_order
            .iter()
            .filter_map(|peer_id| self.links.get(peer_id))
            .map(|link| RemoteMedia {
                peer_id: link.id.peer_id.clone(),
                tracks: link.remote_tracks.clone(),
            })
            .collect();

        self.view_tx.send_replace(MeshView {
            local_peer: self.local_peer.clone(),
            room: self.room.clone(),
            signaling_available: self.signaling_available,
            local_media: self.local_media.clone(),
            remote_media,
            peers,
        });
    }
}

impl std::fmt::Debug for MeshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshSession")
            .field("local_peer", &self.local_peer)
            .field("room", &self.room)
            .field("links", &self.links.len())
            .finish()
    }
}
