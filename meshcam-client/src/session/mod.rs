mod mesh_view;
mod negotiator;
mod peer_link;
mod session;
mod session_command;
mod session_handle;

pub use mesh_view::*;
pub use session::*;
pub use session_handle::*;
