use anyhow::{Result, bail};
use async_trait::async_trait;
use meshcam_client::{
    ConnectionState, IceCandidate, IceServerConfig, LinkId, LocalMedia, PeerConnection,
    PeerConnector, PeerId, RemoteTrack, SdpKind, SessionDescription, TrackKind, TransportEvent,
    TransportEventKind,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

/// Every primitive operation the session performed, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCall {
    AttachMedia,
    CreateOffer,
    CreateAnswer,
    SetLocal(SdpKind),
    SetRemote(SdpKind),
    AddCandidate(String),
    Close,
}

/// Stand-in for a webrtc peer connection.
///
/// Installing a local description emits one local candidate. Once both
/// descriptions are installed it reports `Connected` and a video track.
pub struct MockConnection {
    pub link: LinkId,
    calls: Mutex<Vec<ConnectionCall>>,
    events: mpsc::Sender<TransportEvent>,
    local_set: AtomicBool,
    remote_set: AtomicBool,
    reject_remote: bool,
}

impl MockConnection {
    pub async fn calls(&self) -> Vec<ConnectionCall> {
        self.calls.lock().await.clone()
    }

    /// Candidates handed to the primitive, in order.
    pub async fn applied_candidates(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                ConnectionCall::AddCandidate(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn is_closed(&self) -> bool {
        self.calls.lock().await.contains(&ConnectionCall::Close)
    }

    /// Polls until `predicate` holds for the call log.
    pub async fn wait_for_calls(
        &self,
        predicate: impl Fn(&[ConnectionCall]) -> bool,
        timeout_ms: u64,
    ) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if predicate(&self.calls.lock().await) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    pub async fn emit_track(&self, track_id: &str, kind: TrackKind) {
        self.emit(TransportEventKind::TrackReceived(RemoteTrack {
            track_id: track_id.to_owned(),
            stream_id: format!("stream-{}", self.link.peer_id),
            kind,
            handle: None,
        }))
        .await;
    }

    pub async fn emit_state(&self, state: ConnectionState) {
        self.emit(TransportEventKind::StateChanged(state)).await;
    }

    async fn emit(&self, kind: TransportEventKind) {
        let _ = self
            .events
            .send(TransportEvent {
                link: self.link.clone(),
                kind,
            })
            .await;
    }

    async fn record(&self, call: ConnectionCall) {
        self.calls.lock().await.push(call);
    }

    async fn maybe_connected(&self) {
        if self.local_set.load(Ordering::SeqCst) && self.remote_set.load(Ordering::SeqCst) {
            self.emit_state(ConnectionState::Connected).await;
            self.emit_track("video", TrackKind::Video).await;
        }
    }
}

#[async_trait]
impl PeerConnection for MockConnection {
    async fn attach_media(&self, _media: &LocalMedia) -> Result<()> {
        self.record(ConnectionCall::AttachMedia).await;
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        self.record(ConnectionCall::CreateOffer).await;
        Ok(SessionDescription::offer(format!("offer-from-{}", self.link)))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.record(ConnectionCall::CreateAnswer).await;
        Ok(SessionDescription::answer(format!("answer-from-{}", self.link)))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.record(ConnectionCall::SetLocal(desc.kind)).await;
        self.local_set.store(true, Ordering::SeqCst);

        self.emit(TransportEventKind::CandidateDiscovered(IceCandidate::new(
            format!("candidate:local-{}", self.link),
        )))
        .await;
        self.maybe_connected().await;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.record(ConnectionCall::SetRemote(desc.kind)).await;
        if self.reject_remote {
            bail!("remote description rejected");
        }
        self.remote_set.store(true, Ordering::SeqCst);
        self.maybe_connected().await;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.record(ConnectionCall::AddCandidate(candidate.candidate.clone()))
            .await;
        if !self.remote_set.load(Ordering::SeqCst) {
            bail!("candidate applied before remote description");
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(ConnectionCall::Close).await;
        Ok(())
    }
}

/// Hands out MockConnections and keeps them around for inspection.
#[derive(Clone, Default)]
pub struct MockConnector {
    connections: Arc<Mutex<Vec<Arc<MockConnection>>>>,
    reject_remote: bool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections whose remote description install always fails.
    pub fn rejecting() -> Self {
        Self {
            reject_remote: true,
            ..Self::default()
        }
    }

    pub async fn connections_for(&self, peer_id: &PeerId) -> Vec<Arc<MockConnection>> {
        self.connections
            .lock()
            .await
            .iter()
            .filter(|conn| &conn.link.peer_id == peer_id)
            .cloned()
            .collect()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Waits for the newest connection to `peer_id`.
    pub async fn wait_for_connection(
        &self,
        peer_id: &PeerId,
        timeout_ms: u64,
    ) -> Result<Arc<MockConnection>> {
        let start = std::time::Instant::now();
        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if let Some(conn) = self.connections_for(peer_id).await.pop() {
                return Ok(conn);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        bail!("No connection to {} after {}ms", peer_id, timeout_ms)
    }
}

#[async_trait]
impl PeerConnector for MockConnector {
    async fn connect(
        &self,
        link: LinkId,
        _ice_servers: &[IceServerConfig],
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<dyn PeerConnection>> {
        tracing::debug!("[MockConnector] connect {}", link);

        let conn = Arc::new(MockConnection {
            link,
            calls: Mutex::new(Vec::new()),
            events,
            local_set: AtomicBool::new(false),
            remote_set: AtomicBool::new(false),
            reject_remote: self.reject_remote,
        });
        self.connections.lock().await.push(conn.clone());
        Ok(conn)
    }
}
