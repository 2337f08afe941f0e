//! TCP Connect Scanner implementation.
//!
//! Performs standard TCP connect scans using the operating system's
//! socket API. The host stack does the handshake; no packets are crafted.

use crate::scanner::traits::{PortState, Prober};
use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// TCP Connect Scanner.
///
/// Uses standard socket connect() calls to determine port status.
/// Does not require elevated privileges.
pub struct TcpConnectScanner {
    target: IpAddr,
    timeout: Duration,
}

/// How a connection attempt ended.
#[derive(Debug)]
pub enum ConnectOutcome {
    Connected,
    TimedOut,
    Failed(io::Error),
}

impl TcpConnectScanner {
    /// Create a new TCP connect scanner.
    ///
    /// # Arguments
    /// * `target` - Target IP address to scan
    /// * `timeout` - Connection timeout per port
    pub fn new(target: IpAddr, timeout: Duration) -> Self {
        Self { target, timeout }
    }

    async fn attempt_connect(&self, addr: SocketAddr) -> ConnectOutcome {
        match timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                ConnectOutcome::Connected
            }
            Ok(Err(e)) => ConnectOutcome::Failed(e),
            Err(_) => ConnectOutcome::TimedOut,
        }
    }
}

/// Map a connection outcome to a port state.
///
/// Timeouts and "no route to host" mean something dropped the attempt;
/// every other error (typically a reset) means nothing listens.
pub fn classify(outcome: &ConnectOutcome) -> PortState {
    match outcome {
        ConnectOutcome::Connected => PortState::Open,
        ConnectOutcome::TimedOut => PortState::Filtered,
        ConnectOutcome::Failed(e) if is_no_route(e) => PortState::Filtered,
        ConnectOutcome::Failed(_) => PortState::Closed,
    }
}

fn is_no_route(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EHOSTUNREACH)
        || e.to_string().to_lowercase().contains("no route to host")
}

#[async_trait]
impl Prober for TcpConnectScanner {
    fn target(&self) -> IpAddr {
        self.target
    }

    async fn probe(&self, port: u16) -> PortState {
        let outcome = self.attempt_connect(SocketAddr::new(self.target, port)).await;
        let state = classify(&outcome);
        tracing::debug!(port, ?outcome, %state, "connect probe finished");
        state
    }
}
