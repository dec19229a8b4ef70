mod peer;
mod room;
mod session;
mod signaling;

pub use peer::PeerId;
pub use room::RoomId;
pub use session::{IceCandidate, SdpKind, SessionDescription};
pub use signaling::{IceServerConfig, SignalMessage};
