//! Scripted ICE engine used by the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use natscope::engine::{
    EngineConfig, EngineError, EngineEventSink, IceCandidateInit, PeerConnection,
    PeerConnectionFactory, SessionDescription,
};
use natscope::nat::{StatsSnapshot, StatsSource};

pub const ANSWER_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\n";

/// Shared record of everything the fake engine was asked to do
#[derive(Default)]
pub struct EngineLog {
    pub created: usize,
    pub closed: usize,
    pub remote_descriptions: Vec<SessionDescription>,
    pub candidates: Vec<Option<IceCandidateInit>>,
    pub sinks: Vec<Arc<dyn EngineEventSink>>,
    pub stats_calls: usize,
    /// Number of upcoming `get_stats` calls that fail
    pub stats_failures: usize,
    pub snapshot: StatsSnapshot,
}

#[derive(Clone, Default)]
pub struct FakeFactory {
    pub log: Arc<Mutex<EngineLog>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stats(json: serde_json::Value) -> Self {
        let factory = Self::new();
        factory.log.lock().snapshot = serde_json::from_value(json).expect("valid stats json");
        factory
    }

    /// Sink handed to the most recently created connection
    pub fn last_sink(&self) -> Arc<dyn EngineEventSink> {
        self.log.lock().sinks.last().cloned().expect("no connection created")
    }
}

#[async_trait]
impl PeerConnectionFactory for FakeFactory {
    async fn create(
        &self,
        _config: &EngineConfig,
        sink: Arc<dyn EngineEventSink>,
    ) -> Result<Box<dyn PeerConnection>, EngineError> {
        let mut log = self.log.lock();
        log.created += 1;
        log.sinks.push(sink);
        Ok(Box::new(FakeConnection {
            log: self.log.clone(),
        }))
    }
}

pub struct FakeConnection {
    log: Arc<Mutex<EngineLog>>,
}

#[async_trait]
impl StatsSource for FakeConnection {
    async fn get_stats(&self) -> Result<StatsSnapshot, EngineError> {
        let mut log = self.log.lock();
        log.stats_calls += 1;
        if log.stats_failures > 0 {
            log.stats_failures -= 1;
            return Err(EngineError::Stats("stats read failed".to_string()));
        }
        Ok(log.snapshot.clone())
    }
}

#[async_trait]
impl PeerConnection for FakeConnection {
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        if desc.sdp.contains("hang") {
            // engine that never answers
            std::future::pending::<()>().await;
        }
        if desc.sdp.contains("reject") {
            return Err(EngineError::InvalidDescription("rejected by engine".to_string()));
        }
        self.log.lock().remote_descriptions.push(desc);
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription, EngineError> {
        Ok(SessionDescription::answer(ANSWER_SDP))
    }

    async fn set_local_description(&self, _desc: SessionDescription) -> Result<(), EngineError> {
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        Some(SessionDescription::answer(ANSWER_SDP))
    }

    async fn add_ice_candidate(
        &self,
        candidate: Option<IceCandidateInit>,
    ) -> Result<(), EngineError> {
        if let Some(init) = &candidate {
            if init.candidate.contains("bogus") {
                return Err(EngineError::InvalidCandidate(init.candidate.clone()));
            }
        }
        self.log.lock().candidates.push(candidate);
        Ok(())
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.log.lock().closed += 1;
        Ok(())
    }
}

/// Stats with one nominated pair whose remote candidate has `remote_type`
pub fn nominated_stats(remote_type: &str, ip: &str, port: u16) -> serde_json::Value {
    serde_json::json!([
        {"id": "rc1", "type": "remote-candidate", "candidateType": remote_type,
         "ip": ip, "port": port},
        {"id": "cp1", "type": "candidate-pair", "remoteCandidateId": "rc1",
         "state": "succeeded", "nominated": true, "bytesSent": 1234, "bytesReceived": 4321}
    ])
}

/// Poll until `check` holds or a second has passed
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
