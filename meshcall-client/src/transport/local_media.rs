use crate::transport::MediaError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};
use uuid::Uuid;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub(crate) fn from_codec(kind: RTPCodecType) -> Option<Self> {
        match kind {
            RTPCodecType::Audio => Some(TrackKind::Audio),
            RTPCodecType::Video => Some(TrackKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// A captured local track plus its enabled flag.
pub struct LocalTrack {
    kind: TrackKind,
    track: Arc<TrackLocalStaticSample>,
    enabled: AtomicBool,
}

impl LocalTrack {
    pub fn new(kind: TrackKind, track: Arc<TrackLocalStaticSample>) -> Self {
        Self {
            kind,
            track,
            enabled: AtomicBool::new(true),
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        Arc::clone(&self.track) as Arc<dyn TrackLocal + Send + Sync>
    }

    /// Sample writers check this before pushing media.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}

/// Local capture shared read-only by every negotiation in a room.
pub struct LocalStream {
    id: String,
    tracks: Vec<LocalTrack>,
}

pub type LocalMediaHandle = Arc<LocalStream>;

impl LocalStream {
    pub fn new(id: impl Into<String>, tracks: Vec<LocalTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &LocalTrack> {
        self.tracks.iter().filter(move |t| t.kind == kind)
    }
}

impl fmt::Debug for LocalStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks.len())
            .finish()
    }
}

/// Local capture collaborator. Only the room actor acquires and releases.
#[async_trait]
pub trait LocalMedia: Send + Sync {
    async fn acquire(&self) -> Result<LocalMediaHandle, MediaError>;

    async fn release(&self, handle: &LocalMediaHandle);

    fn set_muted(&self, handle: &LocalMediaHandle, kind: TrackKind, muted: bool) {
        for track in handle.tracks_of(kind) {
            track.set_enabled(!muted);
        }
    }
}

/// Opus + VP8 sample tracks with nothing captured into them. Something
/// outside the room (a file player, a capture loop) writes the samples.
#[derive(Debug, Clone, Default)]
pub struct SampleTrackMedia;

impl SampleTrackMedia {
    fn sample_track(mime_type: &str, kind: TrackKind, stream_id: &str) -> LocalTrack {
        let track = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime_type.to_owned(),
                ..Default::default()
            },
            kind.to_string(),
            stream_id.to_owned(),
        );
        LocalTrack::new(kind, Arc::new(track))
    }
}

#[async_trait]
impl LocalMedia for SampleTrackMedia {
    async fn acquire(&self) -> Result<LocalMediaHandle, MediaError> {
        let stream_id = Uuid::new_v4().to_string();
        let tracks = vec![
            Self::sample_track(MIME_TYPE_OPUS, TrackKind::Audio, &stream_id),
            Self::sample_track(MIME_TYPE_VP8, TrackKind::Video, &stream_id),
        ];
        info!("Local media acquired (stream {})", stream_id);
        Ok(Arc::new(LocalStream::new(stream_id, tracks)))
    }

    async fn release(&self, handle: &LocalMediaHandle) {
        for track in handle.tracks() {
            track.set_enabled(false);
        }
        debug!("Local media released (stream {})", handle.id());
    }
}
