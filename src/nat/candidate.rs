//! ICE candidate line parsing
//!
//! Extracts the fields the NAT heuristic needs from an `a=candidate` style
//! attribute (RFC 8839). Anything after the candidate type is ignored.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// Digit and word classes are ASCII only; `\d` would also accept other scripts.
static CANDIDATE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"candidate:(?P<foundation>\S+)\s+[0-9]+\s+(?P<protocol>udp|tcp)\s+[0-9]+\s+(?P<address>[0-9A-Fa-f:.]+)\s+(?P<port>[0-9]+)\s+typ\s+(?P<type>[A-Za-z0-9_]+)",
    )
    .expect("candidate pattern is valid")
});

/// Candidate type as advertised after the `typ` token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateType {
    #[serde(rename = "host")]
    Host,
    #[serde(rename = "srflx")]
    ServerReflexive,
    #[serde(rename = "prflx")]
    PeerReflexive,
    #[serde(rename = "relay")]
    Relay,
}

impl CandidateType {
    /// Wire token for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::ServerReflexive => "srflx",
            Self::PeerReflexive => "prflx",
            Self::Relay => "relay",
        }
    }

    /// Peer-reflexive addresses are NAT-translated just like server-reflexive
    /// ones, so the classifier folds them together.
    pub fn normalized(self) -> Self {
        match self {
            Self::PeerReflexive => Self::ServerReflexive,
            other => other,
        }
    }
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandidateType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(Self::Host),
            "srflx" => Ok(Self::ServerReflexive),
            "prflx" => Ok(Self::PeerReflexive),
            "relay" => Ok(Self::Relay),
            _ => Err(()),
        }
    }
}

/// Transport protocol of a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    Udp,
    Tcp,
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp => f.write_str("udp"),
            Self::Tcp => f.write_str("tcp"),
        }
    }
}

/// A parsed ICE candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub foundation: String,
    pub protocol: TransportProtocol,
    /// Address literal exactly as written in the line (not validated)
    pub address: String,
    pub port: u16,
    pub candidate_type: CandidateType,
}

/// Parse a raw candidate attribute.
///
/// Returns `None` when the line does not have the expected shape, the port
/// does not fit in 16 bits, or the type is not one of host/srflx/prflx/relay.
pub fn parse_candidate(line: &str) -> Option<Candidate> {
    let caps = CANDIDATE_LINE.captures(line)?;

    let protocol = match &caps["protocol"] {
        "udp" => TransportProtocol::Udp,
        "tcp" => TransportProtocol::Tcp,
        _ => return None,
    };
    let port = caps["port"].parse::<u16>().ok()?;
    let candidate_type = caps["type"].parse::<CandidateType>().ok()?;

    Some(Candidate {
        foundation: caps["foundation"].to_string(),
        protocol,
        address: caps["address"].to_string(),
        port,
        candidate_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_srflx_candidate() {
        let line =
            "candidate:842163049 1 udp 1677729535 203.0.113.10 54400 typ srflx raddr 0.0.0.0 rport 0";
        let parsed = parse_candidate(line).expect("line should parse");

        assert_eq!(parsed.foundation, "842163049");
        assert_eq!(parsed.protocol, TransportProtocol::Udp);
        assert_eq!(parsed.address, "203.0.113.10");
        assert_eq!(parsed.port, 54400);
        assert_eq!(parsed.candidate_type, CandidateType::ServerReflexive);
    }

    #[test]
    fn test_parse_malformed_returns_none() {
        assert!(parse_candidate("invalid-candidate-line").is_none());
        assert!(parse_candidate("").is_none());
        // missing `typ`
        assert!(parse_candidate("candidate:1 1 udp 2122260223 10.0.0.2 5000 host").is_none());
    }

    #[test]
    fn test_parse_ipv6_tcp_with_attribute_prefix() {
        let line = "a=candidate:3 1 tcp 1518280447 2001:db8::1 9 typ host tcptype active";
        let parsed = parse_candidate(line).unwrap();

        assert_eq!(parsed.protocol, TransportProtocol::Tcp);
        assert_eq!(parsed.address, "2001:db8::1");
        assert_eq!(parsed.port, 9);
        assert_eq!(parsed.candidate_type, CandidateType::Host);
    }

    #[test]
    fn test_parse_tolerates_extra_whitespace() {
        let line = "candidate:abc  1\tudp   100  192.0.2.7   3478  typ   relay";
        let parsed = parse_candidate(line).unwrap();
        assert_eq!(parsed.port, 3478);
        assert_eq!(parsed.candidate_type, CandidateType::Relay);
    }

    #[test]
    fn test_parse_rejects_uppercase_protocol() {
        let line = "candidate:1 1 UDP 2122260223 10.0.0.2 5000 typ host";
        assert!(parse_candidate(line).is_none());
    }

    #[test]
    fn test_parse_rejects_out_of_range_port() {
        let line = "candidate:1 1 udp 2122260223 10.0.0.2 70000 typ host";
        assert!(parse_candidate(line).is_none());
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let line = "candidate:1 1 udp 2122260223 10.0.0.2 5000 typ bogus";
        assert!(parse_candidate(line).is_none());
    }

    #[test]
    fn test_parse_rejects_non_ascii_digits() {
        // Arabic-Indic digits in component and priority
        assert!(parse_candidate("candidate:1 \u{0661} udp \u{0661} 1.2.3.4 5 typ host").is_none());
        // and in the port
        assert!(parse_candidate("candidate:1 1 udp 1 1.2.3.4 \u{0665} typ host").is_none());
        assert!(parse_candidate("candidate:1 1 udp 1 1.2.3.4 5 typ host").is_some());
    }

    #[test]
    fn test_prflx_normalizes_to_srflx() {
        assert_eq!(
            CandidateType::PeerReflexive.normalized(),
            CandidateType::ServerReflexive
        );
        assert_eq!(CandidateType::Relay.normalized(), CandidateType::Relay);
    }
}
