//! Registry of live signaling sessions

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use parking_lot::RwLock;
use uuid::Uuid;

use super::session::CloseSignal;

/// Summary of a live session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: Uuid,
    pub peer_addr: SocketAddr,
    pub opened_at: Instant,
}

struct Entry {
    info: SessionInfo,
    close: CloseSignal,
}

/// Sessions keyed by id, inserted on transport connect and removed on close
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Entry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: Uuid, peer_addr: SocketAddr, close: CloseSignal) {
        let info = SessionInfo {
            id,
            peer_addr,
            opened_at: Instant::now(),
        };
        self.sessions.write().insert(id, Entry { info, close });
    }

    pub fn remove(&self, id: &Uuid) -> Option<SessionInfo> {
        self.sessions.write().remove(id).map(|entry| entry.info)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.sessions.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .read()
            .values()
            .map(|entry| entry.info.clone())
            .collect()
    }

    /// Signal every live session to tear down
    pub fn close_all(&self) {
        for entry in self.sessions.read().values() {
            entry.close.close();
        }
    }
}
