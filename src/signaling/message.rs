//! Signaling message types
//!
//! JSON text frames exchanged with the browser. Inbound frames are decoded in
//! two steps so that "not JSON" and "JSON we do not understand" can be told
//! apart.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::{IceCandidateInit, SessionDescription};
use crate::nat::NatVerdict;

/// Client -> server messages
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth,
    Offer {
        /// Either a bare SDP string or a `{type, sdp}` object
        #[serde(default)]
        sdp: Value,
    },
    Candidate {
        #[serde(default)]
        candidate: Value,
        #[serde(default, rename = "sdpMid")]
        sdp_mid: Value,
        #[serde(default, rename = "sdpMLineIndex")]
        sdp_mline_index: Value,
    },
    Finish,
}

/// Why an inbound frame could not be turned into a [`ClientMessage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Not valid JSON
    BadJson,
    /// Valid JSON with a missing or unsupported `type`
    UnknownMessage,
}

impl ClientMessage {
    /// Decode one text frame
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text).map_err(|_| DecodeError::BadJson)?;
        serde_json::from_value(value).map_err(|_| DecodeError::UnknownMessage)
    }
}

/// Error codes sent to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadJson,
    OfferError,
    CandidateError,
    NatInferError,
    UnknownMessage,
}

impl ErrorCode {
    /// Fixed client-facing message for this code
    pub fn message(&self) -> &'static str {
        match self {
            Self::BadJson => "Message must be valid JSON",
            Self::OfferError => "Failed to process offer",
            Self::CandidateError => "Failed to add ICE candidate",
            Self::NatInferError => "Failed to infer NAT type",
            Self::UnknownMessage => "Unsupported message type",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::BadJson => "BAD_JSON",
            Self::OfferError => "OFFER_ERROR",
            Self::CandidateError => "CANDIDATE_ERROR",
            Self::NatInferError => "NAT_INFER_ERROR",
            Self::UnknownMessage => "UNKNOWN_MESSAGE",
        };
        f.write_str(code)
    }
}

impl From<DecodeError> for ErrorCode {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::BadJson => Self::BadJson,
            DecodeError::UnknownMessage => Self::UnknownMessage,
        }
    }
}

/// Server -> client messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthOk {
        ok: bool,
    },
    Answer {
        sdp: SessionDescription,
    },
    Candidate {
        candidate: String,
        #[serde(rename = "sdpMid")]
        sdp_mid: Option<String>,
        #[serde(rename = "sdpMLineIndex")]
        sdp_mline_index: Option<u16>,
    },
    NatResult(NatVerdict),
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl ServerMessage {
    pub fn error(code: ErrorCode) -> Self {
        Self::Error {
            code,
            message: code.message().to_string(),
        }
    }
}

impl From<IceCandidateInit> for ServerMessage {
    fn from(candidate: IceCandidateInit) -> Self {
        Self::Candidate {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
        }
    }
}
