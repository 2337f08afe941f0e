//! # portsweep - port-state reconnaissance
//!
//! Reports, for one target host and a list of ports, whether each port is
//! open, closed, filtered or (UDP only) open-or-filtered.
//!
//! ## Scan Modes
//!
//! - **TCP connect**: full handshake through the OS socket API, no privileges
//! - **SYN**: crafted half-open probes read off a raw capture session
//! - **UDP**: datagrams plus ICMP port-unreachable capture, in retried batches
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use portsweep::config::ScanSettings;
//! use portsweep::scanner::{self, ScanMode};
//! use portsweep::types::{select_interface, ScanRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let request = ScanRequest::new(
//!         vec!["192.168.1.1".parse()?],
//!         [22, 80, 443],
//!         ScanMode::Connect,
//!         select_interface(None)?,
//!     );
//!     let report = scanner::run_scan(&request, &ScanSettings::default()).await?;
//!     report.print()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`types`] - Request-side types: ports, targets, interfaces
//! - [`packet`] - Probe frame encoding and reply decoding
//! - [`capture`] - Filtered capture sessions and the shared transmitter
//! - [`resolver`] - Next-hop hardware address resolution
//! - [`scanner`] - The three probers and the concurrent dispatcher
//! - [`output`] - Result aggregation and the printed table
//! - [`config`] - Scan settings
//! - [`error`] - Error types

pub mod capture;
pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod packet;
pub mod resolver;
pub mod scanner;
pub mod types;

// Re-export commonly used types
pub use error::{CliError, ScanError};
pub use output::ScanReport;
pub use scanner::{PortState, Prober, ScanMode, ScanVerdict};
pub use types::{PortSpec, ScanRequest, TargetSpec};
