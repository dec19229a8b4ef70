use crate::error::Result;
use crate::media::LocalMedia;
use meshcam_core::RoomId;
use tokio::sync::oneshot;

/// Requests from the UI shell to the session actor.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    StartLocalMedia {
        reply: oneshot::Sender<Result<LocalMedia>>,
    },

    JoinRoom {
        room: RoomId,
        reply: oneshot::Sender<Result<()>>,
    },

    LeaveRoom {
        reply: oneshot::Sender<Result<()>>,
    },

    Teardown {
        reply: oneshot::Sender<()>,
    },
}
