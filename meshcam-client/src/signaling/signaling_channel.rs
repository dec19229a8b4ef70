use crate::error::SignalingError;
use async_trait::async_trait;
use meshcam_core::SignalMessage;

/// Outbound half of the relay connection, as seen by the session.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    async fn send(&self, msg: SignalMessage) -> Result<(), SignalingError>;

    async fn disconnect(&self);
}

/// What the inbound half of a signaling channel delivers to the session.
#[derive(Debug)]
pub enum SignalingEvent {
    Message(SignalMessage),

    /// The channel dropped. Links stay up; the relay connection may come back.
    Closed,
}
