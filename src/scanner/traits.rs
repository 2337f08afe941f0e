//! Scanner trait abstraction and the verdict types every scanner produces.

use crate::error::ScanError;
use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;

/// State of a scanned port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortState {
    /// The probe never completed (capture or send failure).
    Unknown,
    /// A listener answered.
    Open,
    /// The host answered that nothing listens.
    Closed,
    /// No answer before the deadline, or the host is unreachable.
    Filtered,
    /// UDP silence: either a listener that ignored us or a filter.
    OpenOrFiltered,
}

impl PortState {
    /// Whether the network told us something other than "closed".
    pub fn is_responsive(self) -> bool {
        matches!(self, Self::Open | Self::Filtered | Self::OpenOrFiltered)
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unknown => "unknown",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Filtered => "filtered",
            Self::OpenOrFiltered => "open/filtered",
        };
        // pad, not write!, so width specifiers apply
        f.pad(label)
    }
}

/// Outcome of probing one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanVerdict {
    pub host: IpAddr,
    pub port: u16,
    pub state: PortState,
}

impl ScanVerdict {
    pub fn new(host: IpAddr, port: u16, state: PortState) -> Self {
        Self { host, port, state }
    }

    pub fn unknown(host: IpAddr, port: u16) -> Self {
        Self::new(host, port, PortState::Unknown)
    }
}

/// Available scan modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ScanMode {
    /// Full TCP connect (no special privileges required).
    #[default]
    Connect,
    /// Half-open SYN probe (requires raw capture privileges).
    Syn,
    /// UDP probe read through ICMP port-unreachable (requires raw capture privileges).
    Udp,
}

impl ScanMode {
    /// Transport label used in the result table.
    pub fn protocol(self) -> &'static str {
        match self {
            Self::Connect | Self::Syn => "tcp",
            Self::Udp => "udp",
        }
    }

    pub fn requires_privileges(self) -> bool {
        !matches!(self, Self::Connect)
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "TCP Connect"),
            Self::Syn => write!(f, "SYN"),
            Self::Udp => write!(f, "UDP"),
        }
    }
}

impl std::str::FromStr for ScanMode {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "connect" | "tcp" => Ok(Self::Connect),
            "syn" | "stealth" => Ok(Self::Syn),
            "udp" => Ok(Self::Udp),
            _ => Err(ScanError::UnknownMode(s.to_string())),
        }
    }
}

/// A per-port prober.
///
/// Implementations probe one port of a fixed target and never fail: a probe
/// that cannot complete reports [`PortState::Unknown`].
#[async_trait]
pub trait Prober: Send + Sync {
    /// The address every probe goes to.
    fn target(&self) -> IpAddr;

    async fn probe(&self, port: u16) -> PortState;
}
