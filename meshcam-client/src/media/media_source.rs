use crate::error::MediaError;
use crate::media::LocalMedia;
use async_trait::async_trait;

/// Produces the local capture stream once the user grants access.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self) -> Result<LocalMedia, MediaError>;

    /// Stop capture for a handle previously returned by `acquire`.
    async fn release(&self, media: &LocalMedia);
}
