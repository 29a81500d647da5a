//! natscope - heuristic NAT behaviour detection over WebRTC signaling
//!
//! A browser negotiates an ICE session with the server; the server watches the
//! reflexive candidates and the selected candidate pair and reports what kind
//! of NAT most likely sits in front of the client.

pub mod config;
pub mod engine;
pub mod nat;
pub mod signaling;

pub use config::ServerConfig;
pub use engine::{PeerConnection, PeerConnectionFactory};
pub use nat::{infer_nat, parse_candidate, NatType, NatVerdict};
pub use signaling::{Session, SignalingServer};
