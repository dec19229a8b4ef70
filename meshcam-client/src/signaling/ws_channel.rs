use crate::error::SignalingError;
use crate::signaling::{SignalingChannel, SignalingEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use meshcam_core::SignalMessage;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Signaling channel over a WebSocket connection to the relay.
pub struct WsSignalingChannel {
    tx: mpsc::UnboundedSender<Message>,
    reader: AbortHandle,
}

impl WsSignalingChannel {
    /// Connects to `url`; inbound frames are decoded and pushed into `events`.
    pub async fn connect(url: &str, events: mpsc::Sender<SignalingEvent>) -> Result<Self> {
        info!("Connecting to signaling relay: {}", url);

        let (ws_stream, _) = connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;
        let (mut sender, mut receiver) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = sender.send(msg).await {
                    error!("Failed to send WS message: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
            debug!("Signaling writer finished");
        });

        let reader = tokio::spawn(async move {
            while let Some(frame) = receiver.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<SignalMessage>(&text) {
                        Ok(signal) => {
                            if events.send(SignalingEvent::Message(signal)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => warn!("Invalid SignalMessage from relay: {:?}", e),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        error!("Signaling relay error: {}", e);
                        break;
                    }
                }
            }
            info!("Signaling relay connection closed");
            let _ = events.send(SignalingEvent::Closed).await;
        });

        Ok(Self {
            tx,
            reader: reader.abort_handle(),
        })
    }
}

#[async_trait]
impl SignalingChannel for WsSignalingChannel {
    async fn send(&self, msg: SignalMessage) -> Result<(), SignalingError> {
        let json = serde_json::to_string(&msg)?;
        self.tx
            .send(Message::Text(json))
            .map_err(|_| SignalingError::Disconnected)
    }

    async fn disconnect(&self) {
        let _ = self.tx.send(Message::Close(None));
        self.reader.abort();
    }
}
