//! Connection statistics snapshot and selected-pair lookup
//!
//! The snapshot mirrors the subset of W3C `RTCStatsReport` records the NAT
//! heuristic reads. Field names follow the W3C camelCase convention so a
//! snapshot can be deserialized straight from a browser-style stats dump.

use serde::{Deserialize, Serialize};

use super::candidate::CandidateType;

/// `candidate-pair` statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePairStats {
    pub id: String,
    #[serde(default)]
    pub remote_candidate_id: Option<String>,
    #[serde(default)]
    pub nominated: bool,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub bytes_sent: Option<u64>,
    #[serde(default)]
    pub bytes_received: Option<u64>,
}

impl CandidatePairStats {
    /// Engines disagree on which field marks the active pair, so any of the
    /// three signals is accepted.
    pub fn is_selected(&self) -> bool {
        self.nominated || self.selected || self.state.as_deref() == Some("succeeded")
    }

    /// Bytes sent plus bytes received; missing counters count as zero
    pub fn total_bytes(&self) -> u64 {
        self.bytes_sent
            .unwrap_or(0)
            .saturating_add(self.bytes_received.unwrap_or(0))
    }
}

/// `remote-candidate` statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCandidateStats {
    pub id: String,
    /// Raw type string; unrecognized values are kept and read as unknown
    #[serde(default)]
    pub candidate_type: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

impl RemoteCandidateStats {
    pub fn candidate_type(&self) -> Option<CandidateType> {
        self.candidate_type.as_deref()?.parse().ok()
    }

    /// `ip` is the older field name, `address` the current one
    pub fn external_ip(&self) -> Option<&str> {
        self.ip.as_deref().or(self.address.as_deref())
    }
}

/// A single typed stats record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StatsReport {
    CandidatePair(CandidatePairStats),
    RemoteCandidate(RemoteCandidateStats),
    /// Any report kind the heuristic does not read
    #[serde(other)]
    Other,
}

/// Ordered collection of stats reports taken at one instant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatsSnapshot {
    reports: Vec<StatsReport>,
}

impl StatsSnapshot {
    pub fn new(reports: Vec<StatsReport>) -> Self {
        Self { reports }
    }

    pub fn reports(&self) -> &[StatsReport] {
        &self.reports
    }

    pub fn push(&mut self, report: StatsReport) {
        self.reports.push(report);
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn candidate_pairs(&self) -> impl Iterator<Item = &CandidatePairStats> {
        self.reports.iter().filter_map(|report| match report {
            StatsReport::CandidatePair(pair) => Some(pair),
            _ => None,
        })
    }

    pub fn remote_candidates(&self) -> impl Iterator<Item = &RemoteCandidateStats> {
        self.reports.iter().filter_map(|report| match report {
            StatsReport::RemoteCandidate(candidate) => Some(candidate),
            _ => None,
        })
    }

    /// Look up a `remote-candidate` record by id
    pub fn remote_candidate(&self, id: &str) -> Option<&RemoteCandidateStats> {
        self.remote_candidates().find(|candidate| candidate.id == id)
    }
}

/// Pick the pair the connection actually uses.
///
/// Among qualifying pairs the one that moved the most bytes wins; on an exact
/// tie the earlier report is kept.
pub fn select_candidate_pair(snapshot: &StatsSnapshot) -> Option<&CandidatePairStats> {
    snapshot
        .candidate_pairs()
        .filter(|pair| pair.is_selected())
        .fold(None, |best: Option<&CandidatePairStats>, pair| match best {
            Some(current) if pair.total_bytes() <= current.total_bytes() => Some(current),
            _ => Some(pair),
        })
}

/// Resolve the remote candidate referenced by `pair`, if present in the snapshot
pub fn resolve_remote_candidate<'a>(
    snapshot: &'a StatsSnapshot,
    pair: &CandidatePairStats,
) -> Option<&'a RemoteCandidateStats> {
    let id = pair.remote_candidate_id.as_deref()?;
    snapshot.remote_candidate(id)
}
