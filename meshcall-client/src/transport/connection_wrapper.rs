use crate::transport::{
    ConnectionState, LocalMediaHandle, MediaError, MediaEvent, MediaEventSink, MediaSession,
    MediaSessionFactory, RemoteMedia, SdpKind, TrackKind, TransportConfig,
};
use async_trait::async_trait;
use meshcall_core::PeerId;
use std::sync::Arc;
use tracing::{debug, info};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

/// [`MediaSession`] backed by a webrtc-rs peer connection.
pub struct ConnectionWrapper {
    pub peer_id: PeerId,
    pub peer_connection: Arc<RTCPeerConnection>,
}

impl ConnectionWrapper {
    /// Build the peer connection, attach the local tracks and route its
    /// callbacks into `events`.
    pub async fn new(
        peer_id: PeerId,
        config: &TransportConfig,
        local_media: &LocalMediaHandle,
        events: MediaEventSink,
    ) -> Result<Self, MediaError> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config.rtc_ice_servers(),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);

        for local_track in local_media.tracks() {
            peer_connection.add_track(local_track.track()).await?;
        }

        let state_sink = events.clone();
        let uid_state = peer_id.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let sink = state_sink.clone();
                let uid = uid_state.clone();

                Box::pin(async move {
                    info!("Peer Connection State changed for {}: {:?}", uid, s);
                    if let Some(state) = ConnectionState::from_rtc(s) {
                        sink.emit(MediaEvent::ConnectionState(state));
                    }
                })
            },
        ));

        let ice_sink = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let sink = ice_sink.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(json_candidate) = candidate.to_json() else {
                    return;
                };
                let Ok(str_candidate) = serde_json::to_string(&json_candidate) else {
                    return;
                };
                sink.emit(MediaEvent::LocalCandidate(str_candidate));
            })
        }));

        let track_sink = events;
        let uid_track = peer_id.clone();
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let sink = track_sink.clone();
                let uid = uid_track.clone();

                Box::pin(async move {
                    let Some(kind) = TrackKind::from_codec(track.kind()) else {
                        return;
                    };
                    debug!("Remote {} track from {}", kind, uid);
                    sink.emit(MediaEvent::RemoteTrack(RemoteMedia {
                        track_id: track.id(),
                        stream_id: track.stream_id(),
                        kind,
                        track: Some(track),
                    }));
                })
            },
        ));

        Ok(Self {
            peer_id,
            peer_connection,
        })
    }
}

#[async_trait]
impl MediaSession for ConnectionWrapper {
    async fn create_offer(&self) -> Result<String, MediaError> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(offer.sdp)
    }

    async fn create_answer(&self) -> Result<String, MediaError> {
        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(answer.sdp)
    }

    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<(), MediaError> {
        let desc = match kind {
            SdpKind::Offer => RTCSessionDescription::offer(sdp)?,
            SdpKind::Answer => RTCSessionDescription::answer(sdp)?,
        };
        self.peer_connection.set_remote_description(desc).await?;
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: String) -> Result<(), MediaError> {
        let candidate: RTCIceCandidateInit = serde_json::from_str(&candidate)
            .map_err(|e| MediaError::Session(format!("bad ICE candidate JSON: {}", e)))?;
        self.peer_connection.add_ice_candidate(candidate).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), MediaError> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

/// Creates a [`ConnectionWrapper`] per remote peer.
#[derive(Debug, Clone, Default)]
pub struct RtcSessionFactory {
    config: TransportConfig,
}

impl RtcSessionFactory {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MediaSessionFactory for RtcSessionFactory {
    async fn create(
        &self,
        peer_id: &PeerId,
        local_media: &LocalMediaHandle,
        events: MediaEventSink,
    ) -> Result<Box<dyn MediaSession>, MediaError> {
        let session =
            ConnectionWrapper::new(peer_id.clone(), &self.config, local_media, events).await?;
        Ok(Box::new(session))
    }
}
