use thiserror::Error;

/// Why local capture could not be started.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("permission to capture audio/video was denied")]
    PermissionDenied,

    #[error("no capture device is available")]
    NoDevice,

    #[error("media source failed: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("signaling channel is disconnected")]
    Disconnected,

    #[error("failed to encode signal message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("signaling transport error: {0}")]
    Transport(String),
}

/// Errors surfaced to the UI shell by session operations.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("local media must be started before joining a room")]
    MediaNotStarted,

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error("session has been torn down")]
    SessionClosed,
}

pub type Result<T, E = MeshError> = std::result::Result<T, E>;
