use webrtc::track::track_local::TrackLocal;
use crate::error::MediaError;
use crate::media::{LocalMedia, MediaSource};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

const VIDEO_FRAME_INTERVAL: Duration = Duration::from_millis(33);
const AUDIO_FRAME_INTERVAL: Duration = Duration::from_millis(20);

/// VP8 key frame header for a 16x16 picture. Receivers only need packets to
/// flow to announce the track.
const PLACEHOLDER_VP8_FRAME: [u8; 10] = [0x50, 0x02, 0x00, 0x9d, 0x01, 0x2a, 0x10, 0x00, 0x10, 0x00];

/// One 20 ms Opus frame of silence.
const OPUS_SILENCE_FRAME: [u8; 3] = [0xf8, 0xff, 0xfe];

/// Media source for headless participants: VP8 video and Opus audio sample
/// tracks fed with placeholder frames on a timer, without touching capture
/// hardware.
#[derive(Debug, Clone)]
pub struct SyntheticMediaSource {
    video: bool,
    audio: bool,
    writers: Arc<Mutex<HashMap<String, Vec<JoinHandle<()>>>>>,
}

impl Default for SyntheticMediaSource {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl SyntheticMediaSource {
    pub fn new(video: bool, audio: bool) -> Self {
        Self {
            video,
            audio,
            writers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Streams whose sample writers are still running.
    pub async fn active_streams(&self) -> usize {
        self.writers.lock().await.len()
    }

    fn spawn_writer(
        track: Arc<TrackLocalStaticSample>,
        frame: &'static [u8],
        interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let sample = Sample {
                    data: frame.to_vec().into(),
                    duration: interval,
                    timestamp: SystemTime::now(),
                    ..Default::default()
                };
                if let Err(e) = track.write_sample(&sample).await {
                    debug!("Failed to write synthetic sample to {}: {}", track.id(), e);
                }
            }
        })
    }
}

#[async_trait]
impl MediaSource for SyntheticMediaSource {
    async fn acquire(&self) -> Result<LocalMedia, MediaError> {
        if !self.video && !self.audio {
            return Err(MediaError::NoDevice);
        }

        let stream_id = format!("meshcam-{}", uuid::Uuid::new_v4());
        let mut tracks = Vec::new();
        let mut writers = Vec::new();

        if self.video {
            let track = Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_owned(),
                    clock_rate: 90000,
                    ..Default::default()
                },
                "video".to_owned(),
                stream_id.clone(),
            ));
            writers.push(Self::spawn_writer(
                Arc::clone(&track),
                &PLACEHOLDER_VP8_FRAME,
                VIDEO_FRAME_INTERVAL,
            ));
            tracks.push(track);
        }

        if self.audio {
            let track = Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    clock_rate: 48000,
                    channels: 2,
                    ..Default::default()
                },
                "audio".to_owned(),
                stream_id.clone(),
            ));
            writers.push(Self::spawn_writer(
                Arc::clone(&track),
                &OPUS_SILENCE_FRAME,
                AUDIO_FRAME_INTERVAL,
            ));
            tracks.push(track);
        }

        info!("Synthetic media started: {} ({} tracks)", stream_id, tracks.len());
        self.writers.lock().await.insert(stream_id.clone(), writers);
        Ok(LocalMedia::new(stream_id, tracks))
    }

    async fn release(&self, media: &LocalMedia) {
        if let Some(writers) = self.writers.lock().await.remove(media.stream_id()) {
            for writer in writers {
                writer.abort();
            }
        }
        info!("Synthetic media released: {}", media.stream_id());
    }
}
