use crate::media::LocalMedia;
use crate::session::{NegotiationRole, NegotiationState};
use crate::signaling::SignalingChannel;
use crate::transport::{LinkId, PeerConnection};
use anyhow::{Context, Result};
use meshcam_core::{IceCandidate, SessionDescription, SignalMessage};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Work queued for one link, processed strictly in order.
#[derive(Debug)]
pub(crate) enum LinkCommand {
    /// Build and send our offer.
    Initiate,
    RemoteOffer(String),
    RemoteAnswer(String),
    RemoteCandidate(IceCandidate),
}

/// Negotiation progress reported back to the session.
#[derive(Debug)]
pub(crate) struct LinkProgress {
    pub(crate) link: LinkId,
    pub(crate) state: NegotiationState,
}

/// Drives the offer/answer exchange of a single link on its own task, so a slow
/// step for one peer never holds up events for another.
pub(crate) struct Negotiator {
    link: LinkId,
    role: NegotiationRole,
    connection: Arc<dyn PeerConnection>,
    signaling: Arc<dyn SignalingChannel>,
    media: Option<LocalMedia>,
    max_pending_candidates: usize,
    closed: Arc<AtomicBool>,
    progress_tx: mpsc::Sender<LinkProgress>,
    state: NegotiationState,
    media_attached: bool,
    remote_description_set: bool,
    pending_candidates: Vec<IceCandidate>,
}

impl Negotiator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        link: LinkId,
        role: NegotiationRole,
        connection: Arc<dyn PeerConnection>,
        signaling: Arc<dyn SignalingChannel>,
        media: Option<LocalMedia>,
        max_pending_candidates: usize,
        closed: Arc<AtomicBool>,
        progress_tx: mpsc::Sender<LinkProgress>,
    ) -> Self {
        Self {
            link,
            role,
            connection,
            signaling,
            media,
            max_pending_candidates,
            closed,
            progress_tx,
            state: NegotiationState::New,
            media_attached: false,
            remote_description_set: false,
            pending_candidates: Vec::new(),
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<LinkCommand>) {
        while let Some(cmd) = commands.recv().await {
            if self.is_closed() {
                break;
            }

            if let Err(e) = self.handle(cmd).await {
                if self.is_closed() {
                    debug!("Negotiation step for {} ended after close: {:?}", self.link, e);
                    break;
                }
                warn!("Negotiation with {} failed: {:?}", self.link, e);
                self.set_state(NegotiationState::Failed).await;
            }
        }

        debug!("Negotiator for {} finished", self.link);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn handle(&mut self, cmd: LinkCommand) -> Result<()> {
        match cmd {
            LinkCommand::Initiate => self.send_offer().await,
            LinkCommand::RemoteOffer(sdp) => self.accept_offer(sdp).await,
            LinkCommand::RemoteAnswer(sdp) => self.accept_answer(sdp).await,
            LinkCommand::RemoteCandidate(candidate) => {
                self.add_remote_candidate(candidate).await;
                Ok(())
            }
        }
    }

    async fn send_offer(&mut self) -> Result<()> {
        if self.role != NegotiationRole::Initiator || self.state != NegotiationState::New {
            debug!("Ignoring initiate for {} in state {:?}", self.link, self.state);
            return Ok(());
        }

        self.attach_media().await?;

        let offer = self
            .connection
            .create_offer()
            .await
            .context("Failed to create offer")?;
        self.connection
            .set_local_description(offer.clone())
            .await
            .context("Failed to set local offer")?;
        if self.is_closed() {
            return Ok(());
        }

        self.set_state(NegotiationState::OfferSent).await;
        info!("Sending offer to {}", self.link);
        self.signaling
            .send(SignalMessage::Offer {
                peer_id: self.link.peer_id.clone(),
                sdp: offer.sdp,
            })
            .await?;
        Ok(())
    }

    async fn accept_offer(&mut self, sdp: String) -> Result<()> {
        if self.role != NegotiationRole::Responder || self.state != NegotiationState::New {
            debug!("Ignoring offer for {} in state {:?}", self.link, self.state);
            return Ok(());
        }

        self.attach_media().await?;

        self.connection
            .set_remote_description(SessionDescription::offer(sdp))
            .await
            .context("Failed to set remote offer")?;
        self.remote_description_set = true;
        self.set_state(NegotiationState::OfferReceived).await;
        self.flush_pending_candidates().await;

        let answer = self
            .connection
            .create_answer()
            .await
            .context("Failed to create answer")?;
        self.connection
            .set_local_description(answer.clone())
            .await
            .context("Failed to set local answer")?;
        if self.is_closed() {
            return Ok(());
        }

        self.set_state(NegotiationState::AnswerSent).await;
        info!("Sending answer to {}", self.link);
        self.signaling
            .send(SignalMessage::Answer {
                peer_id: self.link.peer_id.clone(),
                sdp: answer.sdp,
            })
            .await?;

        self.set_state(NegotiationState::Stable).await;
        Ok(())
    }

    async fn accept_answer(&mut self, sdp: String) -> Result<()> {
        if self.role != NegotiationRole::Initiator || self.state != NegotiationState::OfferSent {
            debug!("Dropping stale answer for {} in state {:?}", self.link, self.state);
            return Ok(());
        }

        self.connection
            .set_remote_description(SessionDescription::answer(sdp))
            .await
            .context("Failed to set remote answer")?;
        self.remote_description_set = true;
        self.set_state(NegotiationState::AnswerReceived).await;
        self.flush_pending_candidates().await;

        self.set_state(NegotiationState::Stable).await;
        Ok(())
    }

    async fn add_remote_candidate(&mut self, candidate: IceCandidate) {
        if self.remote_description_set {
            self.apply_candidate(candidate).await;
            return;
        }

        if self.pending_candidates.len() >= self.max_pending_candidates {
            warn!("Pending candidate queue full for {}, dropping candidate", self.link);
            return;
        }
        self.pending_candidates.push(candidate);
    }

    async fn flush_pending_candidates(&mut self) {
        let pending = std::mem::take(&mut self.pending_candidates);
        if !pending.is_empty() {
            debug!("Applying {} queued candidates for {}", pending.len(), self.link);
        }
        for candidate in pending {
            self.apply_candidate(candidate).await;
        }
    }

    async fn apply_candidate(&self, candidate: IceCandidate) {
        if let Err(e) = self.connection.add_ice_candidate(candidate).await {
            warn!("Failed to add ICE candidate for {}: {:?}", self.link, e);
        }
    }

    async fn attach_media(&mut self) -> Result<()> {
        if self.media_attached {
            return Ok(());
        }
        if let Some(media) = &self.media {
            self.connection
                .attach_media(media)
                .await
                .context("Failed to attach local media")?;
        }
        self.media_attached = true;
        Ok(())
    }

    async fn set_state(&mut self, state: NegotiationState) {
        self.state = state;
        let _ = self
            .progress_tx
            .send(LinkProgress {
                link: self.link.clone(),
                state,
            })
            .await;
    }
}
