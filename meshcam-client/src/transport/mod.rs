mod peer_connection;
mod rtc_connection;
mod transport_event;

pub use peer_connection::*;
pub use rtc_connection::*;
pub use transport_event::*;
