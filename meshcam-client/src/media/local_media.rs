use std::fmt;
use std::sync::Arc;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub(crate) fn from_codec_type(kind: RTPCodecType) -> Option<Self> {
        match kind {
            RTPCodecType::Audio => Some(Self::Audio),
            RTPCodecType::Video => Some(Self::Video),
            _ => None,
        }
    }
}

struct LocalMediaInner {
    stream_id: String,
    tracks: Vec<Arc<TrackLocalStaticSample>>,
}

/// Local capture stream shared read-only by every outgoing connection.
#[derive(Clone)]
pub struct LocalMedia {
    inner: Arc<LocalMediaInner>,
}

impl LocalMedia {
    pub fn new(stream_id: impl Into<String>, tracks: Vec<Arc<TrackLocalStaticSample>>) -> Self {
        Self {
            inner: Arc::new(LocalMediaInner {
                stream_id: stream_id.into(),
                tracks,
            }),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.inner.stream_id
    }

    pub fn tracks(&self) -> &[Arc<TrackLocalStaticSample>] {
        &self.inner.tracks
    }

    pub fn track_ids(&self) -> Vec<String> {
        self.inner
            .tracks
            .iter()
            .map(|track| track.id().to_owned())
            .collect()
    }

    /// Whether both handles refer to the same acquired stream.
    pub fn same_stream(&self, other: &LocalMedia) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for LocalMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalMedia")
            .field("stream_id", &self.inner.stream_id)
            .field("tracks", &self.track_ids())
            .finish()
    }
}
