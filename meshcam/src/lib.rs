pub use meshcam_core::model::{PeerId, RoomId};

pub mod model {
    pub use meshcam_core::model::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use meshcam_client::*;
}

#[cfg(feature = "relay")]
pub mod relay {
    pub use meshcam_relay::*;
}
