//! NAT category mapping
//!
//! Maps the selected remote candidate type and the reflexive ports observed
//! during gathering onto a NAT category. A single ICE negotiation cannot
//! observe filtering directly, so cone NATs are always reported as port
//! restricted.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::candidate::CandidateType;

/// NAT behaviour category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NatType {
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "NAT1")]
    FullCone,
    #[serde(rename = "NAT2")]
    RestrictedCone,
    #[serde(rename = "NAT3")]
    PortRestrictedCone,
    #[serde(rename = "NAT4")]
    Symmetric,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl NatType {
    /// Short code used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::FullCone => "NAT1",
            Self::RestrictedCone => "NAT2",
            Self::PortRestrictedCone => "NAT3",
            Self::Symmetric => "NAT4",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Open => "Open Internet (heuristic)",
            Self::FullCone => "Full Cone (heuristic)",
            Self::RestrictedCone => "Restricted Cone (heuristic)",
            Self::PortRestrictedCone => "Port Restricted Cone (heuristic)",
            Self::Symmetric => "Symmetric (heuristic)",
            Self::Unknown => "Unknown NAT behaviour",
        }
    }
}

impl fmt::Display for NatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// RFC 4787 mapping behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingBehavior {
    /// Endpoint-Independent Mapping
    #[serde(rename = "EIM")]
    EndpointIndependent,
    /// Address-Dependent Mapping
    #[serde(rename = "ADM")]
    AddressDependent,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

/// RFC 4787 filtering behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilteringBehavior {
    /// Endpoint-Independent Filtering
    #[serde(rename = "EIF")]
    EndpointIndependent,
    /// Address and Port-Dependent Filtering
    #[serde(rename = "APDF")]
    AddressAndPortDependent,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

/// Evidence backing a NAT category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatEvidence {
    pub mapping: MappingBehavior,
    pub filtering: FilteringBehavior,
    /// Sorted distinct reflexive ports
    pub srflx_ports: Vec<u16>,
    pub relay_only: bool,
}

impl NatEvidence {
    /// Evidence for a verdict that could not be derived
    pub fn unknown(srflx_ports: Vec<u16>) -> Self {
        Self {
            mapping: MappingBehavior::Unknown,
            filtering: FilteringBehavior::Unknown,
            srflx_ports,
            relay_only: false,
        }
    }
}

/// Category plus evidence produced by [`describe_nat_type`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatAssessment {
    pub nat_type: NatType,
    pub evidence: NatEvidence,
}

/// Sorted, deduplicated copy of the observed ports
pub fn sorted_unique_ports<I>(ports: I) -> Vec<u16>
where
    I: IntoIterator<Item = u16>,
{
    ports.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Classify from the selected remote candidate type and observed ports.
///
/// First matching rule wins:
/// relay, then more than one distinct port, then host, then reflexive,
/// otherwise unknown.
pub fn describe_nat_type<I>(remote_type: Option<CandidateType>, srflx_ports: I) -> NatAssessment
where
    I: IntoIterator<Item = u16>,
{
    let ports = sorted_unique_ports(srflx_ports);
    let remote_type = remote_type.map(CandidateType::normalized);
    let is_relay = remote_type == Some(CandidateType::Relay);

    let (nat_type, mapping, filtering, relay_only) = if is_relay {
        (
            NatType::Symmetric,
            MappingBehavior::AddressDependent,
            FilteringBehavior::AddressAndPortDependent,
            true,
        )
    } else if ports.len() > 1 {
        (
            NatType::Symmetric,
            MappingBehavior::AddressDependent,
            FilteringBehavior::AddressAndPortDependent,
            is_relay,
        )
    } else {
        match remote_type {
            Some(CandidateType::Host) => (
                NatType::Open,
                MappingBehavior::EndpointIndependent,
                FilteringBehavior::EndpointIndependent,
                false,
            ),
            Some(CandidateType::ServerReflexive) => (
                NatType::PortRestrictedCone,
                MappingBehavior::EndpointIndependent,
                FilteringBehavior::AddressAndPortDependent,
                false,
            ),
            _ => (
                NatType::Unknown,
                MappingBehavior::Unknown,
                FilteringBehavior::Unknown,
                is_relay,
            ),
        }
    };

    NatAssessment {
        nat_type,
        evidence: NatEvidence {
            mapping,
            filtering,
            srflx_ports: ports,
            relay_only,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_is_symmetric_and_relay_only() {
        let result = describe_nat_type(Some(CandidateType::Relay), [40000]);
        assert_eq!(result.nat_type, NatType::Symmetric);
        assert_eq!(result.evidence.mapping, MappingBehavior::AddressDependent);
        assert_eq!(
            result.evidence.filtering,
            FilteringBehavior::AddressAndPortDependent
        );
        assert!(result.evidence.relay_only);
    }

    #[test]
    fn test_port_variation_beats_host() {
        let result = describe_nat_type(Some(CandidateType::Host), [62000, 61000, 62000]);
        assert_eq!(result.nat_type, NatType::Symmetric);
        assert!(!result.evidence.relay_only);
        assert_eq!(result.evidence.srflx_ports, vec![61000, 62000]);
    }

    #[test]
    fn test_host_is_open() {
        let result = describe_nat_type(Some(CandidateType::Host), [55000]);
        assert_eq!(result.nat_type, NatType::Open);
        assert_eq!(result.evidence.mapping, MappingBehavior::EndpointIndependent);
        assert_eq!(result.evidence.filtering, FilteringBehavior::EndpointIndependent);
    }

    #[test]
    fn test_reflexive_single_port_is_port_restricted() {
        for remote in [CandidateType::ServerReflexive, CandidateType::PeerReflexive] {
            let result = describe_nat_type(Some(remote), [50000, 50000]);
            assert_eq!(result.nat_type, NatType::PortRestrictedCone);
            assert_eq!(result.evidence.srflx_ports, vec![50000]);
        }

        let no_ports = describe_nat_type(Some(CandidateType::ServerReflexive), []);
        assert_eq!(no_ports.nat_type, NatType::PortRestrictedCone);
    }

    #[test]
    fn test_missing_type_is_unknown() {
        let result = describe_nat_type(None, [1234]);
        assert_eq!(result.nat_type, NatType::Unknown);
        assert_eq!(result.evidence, NatEvidence::unknown(vec![1234]));
    }

    #[test]
    fn test_labels_and_codes() {
        assert_eq!(NatType::Symmetric.code(), "NAT4");
        assert_eq!(NatType::PortRestrictedCone.label(), "Port Restricted Cone (heuristic)");
        assert_eq!(
            serde_json::to_string(&NatType::FullCone).unwrap(),
            "\"NAT1\""
        );
    }
}
