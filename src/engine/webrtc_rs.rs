//! Peer connections backed by the `webrtc` crate

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::stats::StatsReportType;

use super::{
    EngineConfig, EngineError, EngineEventSink, IceCandidateInit, IceConnectionState,
    PeerConnection, PeerConnectionFactory, PeerConnectionState, SdpType, SessionDescription,
};
use crate::nat::{
    CandidatePairStats, RemoteCandidateStats, StatsReport, StatsSnapshot, StatsSource,
};

fn backend(err: webrtc::Error) -> EngineError {
    EngineError::Backend(err.to_string())
}

/// Factory for `webrtc` peer connections
pub struct WebRtcFactory {
    api: API,
}

impl WebRtcFactory {
    pub fn new() -> Result<Self, EngineError> {
        let mut media = MediaEngine::default();
        media.register_default_codecs().map_err(backend)?;
        let api = APIBuilder::new().with_media_engine(media).build();
        Ok(Self { api })
    }
}

#[async_trait]
impl PeerConnectionFactory for WebRtcFactory {
    async fn create(
        &self,
        config: &EngineConfig,
        sink: Arc<dyn EngineEventSink>,
    ) -> Result<Box<dyn PeerConnection>, EngineError> {
        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let pc = Arc::new(self.api.new_peer_connection(rtc_config).await.map_err(backend)?);

        let candidate_sink = sink.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            if let Some(candidate) = candidate {
                match candidate.to_json() {
                    Ok(init) => candidate_sink.on_candidate(IceCandidateInit {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                    }),
                    Err(e) => warn!("Failed to serialize local candidate: {}", e),
                }
            }
            Box::pin(async {})
        }));

        let ice_sink = sink.clone();
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            ice_sink.on_ice_connection_state(ice_state(state));
            Box::pin(async {})
        }));

        let state_sink = sink.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            state_sink.on_connection_state(connection_state(state));
            Box::pin(async {})
        }));

        pc.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
            sink.on_data_channel(channel.label().to_string());
            Box::pin(async {})
        }));

        Ok(Box::new(WebRtcConnection { pc }))
    }
}

struct WebRtcConnection {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl StatsSource for WebRtcConnection {
    async fn get_stats(&self) -> Result<StatsSnapshot, EngineError> {
        let report = self.pc.get_stats().await;
        let mut snapshot = StatsSnapshot::default();

        for stats in report.reports.values() {
            match stats {
                StatsReportType::CandidatePair(pair) => {
                    snapshot.push(StatsReport::CandidatePair(CandidatePairStats {
                        id: pair.id.clone(),
                        remote_candidate_id: Some(pair.remote_candidate_id.clone()),
                        nominated: pair.nominated,
                        selected: false,
                        state: Some(pair.state.to_string()),
                        bytes_sent: Some(pair.bytes_sent),
                        bytes_received: Some(pair.bytes_received),
                    }))
                }
                StatsReportType::RemoteCandidate(candidate) => {
                    snapshot.push(StatsReport::RemoteCandidate(RemoteCandidateStats {
                        id: candidate.id.clone(),
                        candidate_type: Some(candidate.candidate_type.to_string()),
                        ip: Some(candidate.ip.clone()),
                        address: None,
                        port: Some(candidate.port),
                    }))
                }
                _ => {}
            }
        }

        Ok(snapshot)
    }
}

#[async_trait]
impl PeerConnection for WebRtcConnection {
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        let desc = to_rtc_description(desc)?;
        self.pc.set_remote_description(desc).await.map_err(backend)
    }

    async fn create_answer(&self) -> Result<SessionDescription, EngineError> {
        let answer = self.pc.create_answer(None).await.map_err(backend)?;
        from_rtc_description(answer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        let desc = to_rtc_description(desc)?;
        self.pc.set_local_description(desc).await.map_err(backend)
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let desc = self.pc.local_description().await?;
        from_rtc_description(desc).ok()
    }

    async fn add_ice_candidate(
        &self,
        candidate: Option<IceCandidateInit>,
    ) -> Result<(), EngineError> {
        // An empty candidate string marks end of candidates
        let init = match candidate {
            Some(candidate) => RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: None,
            },
            None => RTCIceCandidateInit::default(),
        };
        self.pc.add_ice_candidate(init).await.map_err(backend)
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.pc.close().await.map_err(backend)
    }
}

fn to_rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription, EngineError> {
    let parsed = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(desc.sdp),
        SdpType::Rollback => {
            return Err(EngineError::Unsupported("rollback".to_string()));
        }
    };
    parsed.map_err(|e| EngineError::InvalidDescription(e.to_string()))
}

fn from_rtc_description(desc: RTCSessionDescription) -> Result<SessionDescription, EngineError> {
    let sdp_type = match desc.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Unspecified => {
            return Err(EngineError::InvalidDescription(
                "unspecified SDP type".to_string(),
            ))
        }
    };
    Ok(SessionDescription {
        sdp_type,
        sdp: desc.sdp,
    })
}

fn ice_state(state: RTCIceConnectionState) -> IceConnectionState {
    match state {
        RTCIceConnectionState::Unspecified | RTCIceConnectionState::New => IceConnectionState::New,
        RTCIceConnectionState::Checking => IceConnectionState::Checking,
        RTCIceConnectionState::Connected => IceConnectionState::Connected,
        RTCIceConnectionState::Completed => IceConnectionState::Completed,
        RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
        RTCIceConnectionState::Failed => IceConnectionState::Failed,
        RTCIceConnectionState::Closed => IceConnectionState::Closed,
    }
}

fn connection_state(state: RTCPeerConnectionState) -> PeerConnectionState {
    match state {
        RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => {
            PeerConnectionState::New
        }
        RTCPeerConnectionState::Connecting => PeerConnectionState::Connecting,
        RTCPeerConnectionState::Connected => PeerConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => PeerConnectionState::Failed,
        RTCPeerConnectionState::Closed => PeerConnectionState::Closed,
    }
}
