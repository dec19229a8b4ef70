use crate::error::{MeshError, Result};
use crate::media::LocalMedia;
use crate::session::MeshView;
use crate::session::session_command::SessionCommand;
use meshcam_core::RoomId;
use tokio::sync::{mpsc, oneshot, watch};

/// Cloneable handle the UI shell uses to drive a running session.
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<SessionCommand>,
    view_rx: watch::Receiver<MeshView>,
}

impl SessionHandle {
    pub(crate) fn new(
        command_tx: mpsc::Sender<SessionCommand>,
        view_rx: watch::Receiver<MeshView>,
    ) -> Self {
        Self {
            command_tx,
            view_rx,
        }
    }

    /// Acquires local capture. Returns the existing handle if already started.
    pub async fn start_local_media(&self) -> Result<LocalMedia> {
        self.request(|reply| SessionCommand::StartLocalMedia { reply })
            .await?
    }

    /// Joins `room`, leaving the current room first if it differs.
    pub async fn join_room(&self, room: impl Into<RoomId>) -> Result<()> {
        let room = room.into();
        self.request(|reply| SessionCommand::JoinRoom { room, reply })
            .await?
    }

    pub async fn leave_room(&self) -> Result<()> {
        self.request(|reply| SessionCommand::LeaveRoom { reply })
            .await?
    }

    /// Shuts the session down. Safe to call any number of times.
    pub async fn teardown(&self) -> Result<()> {
        match self
            .request(|reply| SessionCommand::Teardown { reply })
            .await
        {
            Ok(()) | Err(MeshError::SessionClosed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Latest snapshot of the session.
    pub fn view(&self) -> MeshView {
        self.view_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MeshView> {
        self.view_rx.clone()
    }

    /// Waits until a snapshot satisfies `predicate`. Returns `None` if the
    /// session stopped first without ever matching.
    pub async fn wait_for_view(
        &self,
        predicate: impl FnMut(&MeshView) -> bool,
    ) -> Option<MeshView> {
        let mut rx = self.view_rx.clone();
        rx.wait_for(predicate).await.ok().map(|view| view.clone())
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(build(reply))
            .await
            .map_err(|_| MeshError::SessionClosed)?;
        rx.await.map_err(|_| MeshError::SessionClosed)
    }
}
