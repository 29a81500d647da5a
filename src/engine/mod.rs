//! Boundary to the ICE/DTLS engine
//!
//! The session orchestrator only talks to the engine through the traits in
//! this module. Engine events are pushed into an [`EngineEventSink`] handed to
//! the factory when the connection is built.

mod error;
#[cfg(feature = "webrtc-engine")]
mod webrtc_rs;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::EngineError;
#[cfg(feature = "webrtc-engine")]
pub use webrtc_rs::WebRtcFactory;

use crate::nat::StatsSource;

/// SDP message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

/// Session description as exchanged over signaling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Candidate as handed to or emitted by the engine
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IceCandidateInit {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

/// ICE agent connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectionState {
    /// Whether a usable candidate pair has been found
    pub fn is_established(&self) -> bool {
        matches!(self, Self::Connected | Self::Completed)
    }
}

impl fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Checking => "checking",
            Self::Connected => "connected",
            Self::Completed => "completed",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Aggregate peer connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerConnectionState {
    /// Failed, closed or disconnected
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }
}

impl fmt::Display for PeerConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// ICE server entry (STUN/TURN URLs)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IceServer {
    pub urls: Vec<String>,
}

/// Settings used to build each peer connection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineConfig {
    pub ice_servers: Vec<IceServer>,
}

/// Receives engine events for one connection
pub trait EngineEventSink: Send + Sync {
    /// A local candidate was gathered
    fn on_candidate(&self, candidate: IceCandidateInit);

    fn on_ice_connection_state(&self, state: IceConnectionState);

    fn on_connection_state(&self, state: PeerConnectionState);

    /// The remote opened a data channel
    fn on_data_channel(&self, label: String);
}

/// One peer connection owned by a session
#[async_trait]
pub trait PeerConnection: StatsSource {
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError>;

    async fn create_answer(&self) -> Result<SessionDescription, EngineError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError>;

    /// Local description after negotiation, if any
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Add a remote candidate; `None` signals end of candidates
    async fn add_ice_candidate(&self, candidate: Option<IceCandidateInit>)
        -> Result<(), EngineError>;

    async fn close(&self) -> Result<(), EngineError>;
}

/// Builds peer connections wired to an event sink
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(
        &self,
        config: &EngineConfig,
        sink: Arc<dyn EngineEventSink>,
    ) -> Result<Box<dyn PeerConnection>, EngineError>;
}
