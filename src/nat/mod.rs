//! NAT classification
//!
//! Candidate parsing, selected-pair lookup and the category heuristic. All of
//! it is side-effect free except [`infer_nat`], which reads statistics from a
//! live connection.

mod candidate;
mod classify;
mod infer;
mod stats;

pub use candidate::{parse_candidate, Candidate, CandidateType, TransportProtocol};
pub use classify::{
    describe_nat_type, sorted_unique_ports, FilteringBehavior, MappingBehavior, NatAssessment,
    NatEvidence, NatType,
};
pub use infer::{infer_nat, NatVerdict, StatsSource, INFERENCE_METHOD};
pub use stats::{
    resolve_remote_candidate, select_candidate_pair, CandidatePairStats, RemoteCandidateStats,
    StatsReport, StatsSnapshot,
};
