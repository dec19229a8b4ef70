use anyhow::{Context, Result, bail};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use meshcam_core::{IceServerConfig, PeerId, SignalMessage};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// Timeout for a single relay message (ms).
pub const RELAY_TIMEOUT_MS: u64 = 2000;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket participant speaking the relay protocol.
pub struct TestClient {
    pub peer_id: PeerId,
    pub ice_servers: Vec<IceServerConfig>,
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
}

impl TestClient {
    /// Connects and consumes the greeting (`Welcome`, then `IceConfig`).
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let url = format!("ws://{}/ws", addr);
        let (ws, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;
        let (sink, stream) = ws.split();

        let mut client = Self {
            peer_id: PeerId::from(""),
            ice_servers: Vec::new(),
            sink,
            stream,
        };

        match client.recv().await? {
            SignalMessage::Welcome { peer_id } => client.peer_id = peer_id,
            other => bail!("Expected Welcome, got {:?}", other),
        }
        match client.recv().await? {
            SignalMessage::IceConfig { ice_servers } => client.ice_servers = ice_servers,
            other => bail!("Expected IceConfig, got {:?}", other),
        }

        tracing::debug!("[TestClient] connected as {}", client.peer_id);
        Ok(client)
    }

    pub async fn send(&mut self, msg: SignalMessage) -> Result<()> {
        let json = serde_json::to_string(&msg)?;
        self.sink
            .send(Message::Text(json))
            .await
            .context("Failed to send to relay")
    }

    pub async fn recv(&mut self) -> Result<SignalMessage> {
        self.recv_within(RELAY_TIMEOUT_MS)
            .await?
            .context("Timed out waiting for relay message")
    }

    /// Returns `None` when nothing arrives within `timeout_ms`.
    pub async fn recv_within(&mut self, timeout_ms: u64) -> Result<Option<SignalMessage>> {
        match tokio::time::timeout(Duration::from_millis(timeout_ms), self.next_message()).await {
            Ok(msg) => msg.map(Some),
            Err(_) => Ok(None),
        }
    }

    async fn next_message(&mut self) -> Result<SignalMessage> {
        while let Some(frame) = self.stream.next().await {
            match frame.context("Relay connection failed")? {
                Message::Text(text) => return Ok(serde_json::from_str(&text)?),
                Message::Close(_) => break,
                _ => continue,
            }
        }
        bail!("Relay closed the connection")
    }

    pub async fn join(&mut self, room: &str) -> Result<Vec<PeerId>> {
        self.send(SignalMessage::Join { room: room.into() }).await?;
        match self.recv().await? {
            SignalMessage::CurrentMembers { peers } => Ok(peers),
            other => bail!("Expected CurrentMembers, got {:?}", other),
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.sink
            .send(Message::Close(None))
            .await
            .context("Failed to close relay connection")
    }
}
