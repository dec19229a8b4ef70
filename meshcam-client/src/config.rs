use anyhow::{Context, Result};
use meshcam_core::IceServerConfig;
use meshcam_core::utils::default_stun_urls;
use serde::Deserialize;
use std::path::Path;

/// Client-side settings for a mesh session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// WebSocket URL of the signaling relay.
    pub signaling_url: String,

    /// STUN/TURN servers handed to every new peer connection. The relay may
    /// replace them with an `IceConfig` message.
    pub ice_servers: Vec<IceServerConfig>,

    /// Capacity of the command queue between handles and the session actor.
    pub command_buffer: usize,

    /// Capacity of the internal event queues (signaling, transport, negotiation).
    pub event_buffer: usize,

    /// Upper bound on remote candidates parked per peer before a remote
    /// description exists for them.
    pub max_pending_candidates: usize,

    /// Upper bound on distinct peers with candidates parked ahead of their offer.
    pub max_early_peers: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://127.0.0.1:8080/ws".to_owned(),
            ice_servers: vec![IceServerConfig {
                urls: default_stun_urls(),
                username: None,
                credential: None,
            }],
            command_buffer: 32,
            event_buffer: 256,
            max_pending_candidates: 64,
            max_early_peers: 32,
        }
    }
}

impl MeshConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse mesh config")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text)
    }
}
