//! Per-client signaling session
//!
//! Every input for a session (inbound frames, engine events) goes through one
//! channel and is handled to completion before the next one, so an offer that
//! replaces the connection can never race a candidate. Transport close arrives
//! out of band on a [`CloseSignal`] and pre-empts whatever is in flight.
//!
//! ```text
//! [*] --> Idle
//! Idle --> Negotiating: offer
//! Negotiating --> Connected: ICE connected/completed
//! Negotiating --> Closed: negotiation failed
//! Connected --> Negotiating: new offer
//! Connected --> Closed: connection failed / transport closed
//! Closed --> Negotiating: new offer
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::message::{ClientMessage, ErrorCode, ServerMessage};
use crate::engine::{
    EngineConfig, EngineError, EngineEventSink, IceCandidateInit, IceConnectionState,
    PeerConnection, PeerConnectionFactory, PeerConnectionState, SdpType, SessionDescription,
};
use crate::nat::{infer_nat, parse_candidate, CandidateType};

/// Lifecycle of the session's current connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No connection yet
    #[default]
    Idle,
    /// Offer received, answer being produced or ICE still checking
    Negotiating,
    /// ICE reported connected or completed
    Connected,
    /// Connection torn down or failed
    Closed,
}

/// Event raised by the engine for one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    LocalCandidate(IceCandidateInit),
    IceConnectionState(IceConnectionState),
    ConnectionState(PeerConnectionState),
    DataChannel(String),
}

/// Input processed by a session worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Text frame from the client
    Inbound(String),
    /// Engine event tagged with the connection generation that raised it
    Engine { generation: u64, event: EngineEvent },
    /// Transport closed
    Closed,
}

/// Tells a session worker that its transport is gone.
///
/// Clones share one flag; once closed it stays closed.
#[derive(Debug, Clone)]
pub struct CloseSignal {
    closed: Arc<watch::Sender<bool>>,
}

impl CloseSignal {
    pub fn new() -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            closed: Arc::new(closed),
        }
    }

    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once [`CloseSignal::close`] has been called
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // Sender lives in `self`, so this only returns once the flag is set
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Forwards engine callbacks into the session's event channel
struct ChannelSink {
    generation: u64,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    fn push(&self, event: EngineEvent) {
        // Receiver is gone once the session has shut down; late events are moot.
        let _ = self.events.send(SessionEvent::Engine {
            generation: self.generation,
            event,
        });
    }
}

impl EngineEventSink for ChannelSink {
    fn on_candidate(&self, candidate: IceCandidateInit) {
        self.push(EngineEvent::LocalCandidate(candidate));
    }

    fn on_ice_connection_state(&self, state: IceConnectionState) {
        self.push(EngineEvent::IceConnectionState(state));
    }

    fn on_connection_state(&self, state: PeerConnectionState) {
        self.push(EngineEvent::ConnectionState(state));
    }

    fn on_data_channel(&self, label: String) {
        self.push(EngineEvent::DataChannel(label));
    }
}

/// One client's signaling session
pub struct Session {
    id: Uuid,
    factory: Arc<dyn PeerConnectionFactory>,
    engine_config: EngineConfig,
    events: mpsc::UnboundedSender<SessionEvent>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    connection: Option<Box<dyn PeerConnection>>,
    /// Bumped for every new connection; stale engine events are dropped
    generation: u64,
    srflx_ports: BTreeSet<u16>,
    classification_sent: bool,
    state: SessionState,
}

impl Session {
    /// Create a session.
    ///
    /// `events` must feed the receiver later passed to [`Session::run`];
    /// engine callbacks are routed through it.
    pub fn new(
        id: Uuid,
        factory: Arc<dyn PeerConnectionFactory>,
        engine_config: EngineConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
        outbound: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        Self {
            id,
            factory,
            engine_config,
            events,
            outbound,
            connection: None,
            generation: 0,
            srflx_ports: BTreeSet::new(),
            classification_sent: false,
            state: SessionState::Idle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    /// Reflexive ports observed on the current connection, ascending
    pub fn srflx_ports(&self) -> Vec<u16> {
        self.srflx_ports.iter().copied().collect()
    }

    pub fn classification_sent(&self) -> bool {
        self.classification_sent
    }

    /// Process events until the transport closes, then tear down.
    ///
    /// `close` pre-empts an event that is still being handled (a stuck engine
    /// call included) and drops anything still queued.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>, close: CloseSignal) {
        loop {
            let event = tokio::select! {
                biased;
                _ = close.closed() => break,
                event = events.recv() => match event {
                    Some(SessionEvent::Closed) | None => break,
                    Some(event) => event,
                },
            };

            tokio::select! {
                biased;
                _ = close.closed() => {
                    debug!(session_id = %self.id, "Transport closed mid-event");
                    break;
                }
                _ = self.handle_event(event) => {}
            }
        }
        self.close().await;
    }

    /// Handle one event. Returns `false` once the session should stop.
    pub async fn handle_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Inbound(text) => {
                self.handle_text(&text).await;
                true
            }
            SessionEvent::Engine { generation, event } => {
                self.handle_engine_event(generation, event).await;
                true
            }
            SessionEvent::Closed => {
                self.close().await;
                false
            }
        }
    }

    async fn handle_text(&mut self, text: &str) {
        let message = match ClientMessage::decode(text) {
            Ok(message) => message,
            Err(err) => {
                debug!(session_id = %self.id, ?err, "Rejected inbound frame");
                self.send(ServerMessage::error(err.into()));
                return;
            }
        };

        match message {
            ClientMessage::Auth => self.send(ServerMessage::AuthOk { ok: true }),
            ClientMessage::Offer { sdp } => self.handle_offer(&sdp).await,
            ClientMessage::Candidate {
                candidate,
                sdp_mid,
                sdp_mline_index,
            } => {
                self.handle_candidate(&candidate, &sdp_mid, &sdp_mline_index)
                    .await
            }
            ClientMessage::Finish => self.send_nat_result().await,
        }
    }

    async fn handle_offer(&mut self, sdp: &Value) {
        self.teardown().await;
        self.generation += 1;
        self.state = SessionState::Negotiating;

        match self.negotiate(sdp).await {
            Ok(answer) => {
                info!(session_id = %self.id, generation = self.generation, "Answer sent");
                self.send(ServerMessage::Answer { sdp: answer });
            }
            Err(e) => {
                error!(
                    event = "webrtc.offer.error",
                    session_id = %self.id,
                    error = %e,
                    "Failed to handle offer"
                );
                self.teardown().await;
                self.state = SessionState::Closed;
                self.send(ServerMessage::error(ErrorCode::OfferError));
            }
        }
    }

    async fn negotiate(&mut self, sdp: &Value) -> Result<SessionDescription, EngineError> {
        let sink = Arc::new(ChannelSink {
            generation: self.generation,
            events: self.events.clone(),
        });
        let connection = self.factory.create(&self.engine_config, sink).await?;
        let connection = self.connection.insert(connection);

        let remote = parse_remote_description(sdp)?;
        connection.set_remote_description(remote).await?;
        let answer = connection.create_answer().await?;
        connection.set_local_description(answer.clone()).await?;

        Ok(connection.local_description().await.unwrap_or(answer))
    }

    async fn handle_candidate(&mut self, candidate: &Value, sdp_mid: &Value, sdp_mline_index: &Value) {
        let Some(connection) = self.connection.as_ref() else {
            debug!(session_id = %self.id, "Candidate before offer ignored");
            return;
        };

        let init = match candidate {
            Value::Null => None,
            Value::String(line) if line.is_empty() => None,
            Value::String(line) => {
                if let Some(parsed) = parse_candidate(line) {
                    if parsed.candidate_type == CandidateType::ServerReflexive {
                        self.srflx_ports.insert(parsed.port);
                    }
                }
                Some(IceCandidateInit {
                    candidate: line.clone(),
                    sdp_mid: sdp_mid.as_str().map(str::to_string),
                    sdp_mline_index: sdp_mline_index
                        .as_u64()
                        .and_then(|index| u16::try_from(index).ok()),
                })
            }
            other => {
                self.candidate_failed(EngineError::InvalidCandidate(format!(
                    "expected string, got {}",
                    other
                )));
                return;
            }
        };

        if let Err(e) = connection.add_ice_candidate(init).await {
            self.candidate_failed(e);
        }
    }

    fn candidate_failed(&self, e: EngineError) {
        error!(
            event = "webrtc.candidate.error",
            session_id = %self.id,
            error = %e,
            "Failed to add ICE candidate"
        );
        self.send(ServerMessage::error(ErrorCode::CandidateError));
    }

    async fn handle_engine_event(&mut self, generation: u64, event: EngineEvent) {
        if generation != self.generation || self.connection.is_none() {
            debug!(session_id = %self.id, generation, "Dropping event from stale connection");
            return;
        }

        match event {
            EngineEvent::LocalCandidate(candidate) => self.send(candidate.into()),
            EngineEvent::IceConnectionState(state) => {
                debug!(event = "webrtc.state", session_id = %self.id, %state);
                if state.is_established() {
                    self.state = SessionState::Connected;
                    self.send_nat_result().await;
                }
            }
            EngineEvent::ConnectionState(state) => {
                if state.is_terminal() {
                    info!(event = "webrtc.connection.state", session_id = %self.id, %state);
                    if state != PeerConnectionState::Disconnected {
                        self.state = SessionState::Closed;
                    }
                }
            }
            EngineEvent::DataChannel(label) => {
                debug!(event = "webrtc.datachannel.open", session_id = %self.id, %label);
            }
        }
    }

    /// Classify the current connection and send the verdict, at most once per
    /// connection. A failed attempt leaves the guard unset so a later trigger
    /// can retry.
    pub async fn send_nat_result(&mut self) {
        if self.classification_sent {
            return;
        }
        let Some(connection) = self.connection.as_deref() else {
            return;
        };

        let session_id = self.id.to_string();
        match infer_nat(connection, self.srflx_ports.iter().copied(), &session_id).await {
            Ok(verdict) => {
                self.send(ServerMessage::NatResult(verdict));
                self.classification_sent = true;
            }
            Err(e) => {
                error!(
                    event = "nat.error",
                    session_id = %self.id,
                    error = %e,
                    "Failed to infer NAT"
                );
                self.send(ServerMessage::error(ErrorCode::NatInferError));
            }
        }
    }

    /// Tear down the connection and release evidence
    pub async fn close(&mut self) {
        if self.state != SessionState::Closed || self.connection.is_some() {
            info!(event = "ws.close", session_id = %self.id, "Session closed");
        }
        self.teardown().await;
        self.state = SessionState::Closed;
    }

    async fn teardown(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                warn!(session_id = %self.id, error = %e, "Error closing peer connection");
            }
        }
        self.srflx_ports.clear();
        self.classification_sent = false;
    }

    fn send(&self, message: ServerMessage) {
        if self.outbound.send(message).is_err() {
            debug!(session_id = %self.id, "Outbound channel closed, dropping message");
        }
    }
}

/// A bare string is an offer SDP; an object must carry both `type` and `sdp`.
fn parse_remote_description(sdp: &Value) -> Result<SessionDescription, EngineError> {
    match sdp {
        Value::String(text) if !text.is_empty() => Ok(SessionDescription::offer(text.clone())),
        Value::Object(fields) => {
            let sdp_type = fields
                .get("type")
                .cloned()
                .and_then(|t| serde_json::from_value::<SdpType>(t).ok());
            let text = fields.get("sdp").and_then(Value::as_str).filter(|s| !s.is_empty());
            match (sdp_type, text) {
                (Some(sdp_type), Some(text)) => Ok(SessionDescription {
                    sdp_type,
                    sdp: text.to_string(),
                }),
                _ => Err(EngineError::InvalidDescription(
                    "Missing SDP fields".to_string(),
                )),
            }
        }
        _ => Err(EngineError::InvalidDescription(
            "Missing SDP fields".to_string(),
        )),
    }
}
