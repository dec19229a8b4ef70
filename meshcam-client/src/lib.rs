mod config;
mod error;
mod media;
mod session;
mod signaling;
mod transport;

pub use config::*;
pub use error::*;
pub use media::*;
pub use session::*;
pub use signaling::*;
pub use transport::*;

pub use meshcam_core::{
    IceCandidate, IceServerConfig, PeerId, RoomId, SdpKind, SessionDescription, SignalMessage,
};
