//! NAT inference from a live connection's statistics

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::candidate::CandidateType;
use super::classify::{describe_nat_type, sorted_unique_ports, NatEvidence, NatType};
use super::stats::{resolve_remote_candidate, select_candidate_pair, StatsSnapshot};
use crate::engine::EngineError;

/// Inference method reported with every verdict
pub const INFERENCE_METHOD: &str = "ICE-HEUR";

/// Anything that can produce a statistics snapshot
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn get_stats(&self) -> Result<StatsSnapshot, EngineError>;
}

/// NAT verdict for one connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatVerdict {
    pub nat_type: NatType,
    pub nat_label: String,
    pub remote_selected_type: Option<CandidateType>,
    pub srflx_ports: Vec<u16>,
    pub method: String,
    pub evidence: NatEvidence,
    pub external_ip: Option<String>,
    pub external_port: Option<u16>,
}

impl NatVerdict {
    /// Verdict when no candidate pair was selected
    pub fn undetermined(srflx_ports: Vec<u16>) -> Self {
        Self {
            nat_type: NatType::Unknown,
            nat_label: NatType::Unknown.label().to_string(),
            remote_selected_type: None,
            srflx_ports: srflx_ports.clone(),
            method: INFERENCE_METHOD.to_string(),
            evidence: NatEvidence::unknown(srflx_ports),
            external_ip: None,
            external_port: None,
        }
    }
}

/// Derive a NAT verdict from `source`'s current statistics.
///
/// A snapshot without a selected pair yields an `UNKNOWN` verdict. Errors
/// from `source` are returned unchanged.
pub async fn infer_nat<S, I>(
    source: &S,
    srflx_ports: I,
    session_id: &str,
) -> Result<NatVerdict, EngineError>
where
    S: StatsSource + ?Sized,
    I: IntoIterator<Item = u16>,
{
    let ports = sorted_unique_ports(srflx_ports);
    let snapshot = source.get_stats().await?;

    let Some(pair) = select_candidate_pair(&snapshot) else {
        warn!(
            event = "nat.infer",
            session_id,
            "No candidate pair nominated"
        );
        return Ok(NatVerdict::undetermined(ports));
    };

    let remote = resolve_remote_candidate(&snapshot, pair);
    let remote_type = remote
        .and_then(|candidate| candidate.candidate_type())
        .map(CandidateType::normalized);
    let assessment = describe_nat_type(remote_type, ports.iter().copied());

    info!(
        event = "nat.infer",
        session_id,
        remote_type = remote_type.map(|t| t.as_str()),
        srflx_ports = ?ports,
        nat = %assessment.nat_type,
        "Derived NAT type"
    );

    Ok(NatVerdict {
        nat_type: assessment.nat_type,
        nat_label: assessment.nat_type.label().to_string(),
        remote_selected_type: remote_type,
        srflx_ports: ports,
        method: INFERENCE_METHOD.to_string(),
        evidence: assessment.evidence,
        external_ip: remote.and_then(|c| c.external_ip()).map(str::to_string),
        external_port: remote.and_then(|c| c.port),
    })
}
