//! Error types for portsweep.
//!
//! Uses `thiserror` for ergonomic error definitions. Per-port failures
//! (`EncodeError`, `CaptureError`, `ScanError::Send`) are recovered by the
//! dispatchers; the rest are surfaced to the caller.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use thiserror::Error;

/// Failure to serialize a probe frame.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("interface {0} has no bound IPv4 address")]
    NoSourceAddress(String),

    #[error("target {0} is not an IPv4 address")]
    UnsupportedTarget(IpAddr),

    #[error("buffer too small for {0} header")]
    BufferTooSmall(&'static str),
}

/// Failure to open or use a capture handle.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("permission denied opening {0}: raw capture requires root/sudo privileges")]
    PermissionDenied(String),

    #[error("unsupported channel type on {0}")]
    UnsupportedChannel(String),

    #[error("failed to open device {interface}: {reason}")]
    Open { interface: String, reason: String },
}

/// Failure to resolve a next-hop hardware address.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("failed to read routing table: {0}")]
    RouteTable(#[from] std::io::Error),

    #[error("no default gateway in routing table")]
    NoGateway,

    #[error("no ARP reply from {0}")]
    Timeout(Ipv4Addr),

    #[error("interface {0} has no bound IPv4 address")]
    NoSourceAddress(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("failed to send ARP request: {0}")]
    Send(String),
}

/// Failure to load or validate settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine configuration directory")]
    DirectoryNotFound,

    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    #[error("invalid settings format: {0}")]
    InvalidFormat(String),

    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Main error type for scanning operations.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("unknown scan mode: {0}")]
    UnknownMode(String),

    #[error("no target addresses to scan")]
    NoHosts,

    #[error("failed to send probe: {0}")]
    Send(String),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the command-line layer.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Port(#[from] crate::types::PortError),

    #[error(transparent)]
    Target(#[from] crate::types::TargetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for scan operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;
