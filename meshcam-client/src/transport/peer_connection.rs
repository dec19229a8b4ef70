use crate::media::LocalMedia;
use crate::transport::{LinkId, TransportEvent};
use anyhow::Result;
use async_trait::async_trait;
use meshcam_core::{IceCandidate, IceServerConfig, SessionDescription};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Orchestration-level view of one negotiated connection.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn attach_media(&self, media: &LocalMedia) -> Result<()>;

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Creates peer connections. Every event of the created connection is tagged
/// with `link` and pushed into `events`.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(
        &self,
        link: LinkId,
        ice_servers: &[IceServerConfig],
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<dyn PeerConnection>>;
}
