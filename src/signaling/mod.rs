//! Signaling server and per-client sessions
//!
//! Handles the offer/answer/candidate exchange with the browser and reports
//! the NAT verdict once ICE has settled.

mod error;
mod message;
mod registry;
mod server;
mod session;

pub use error::SignalingError;
pub use message::{ClientMessage, DecodeError, ErrorCode, ServerMessage};
pub use registry::{SessionInfo, SessionRegistry};
pub use server::SignalingServer;
pub use session::{CloseSignal, EngineEvent, Session, SessionEvent, SessionState};
