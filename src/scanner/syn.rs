//! SYN (half-open) Scanner implementation.
//!
//! Sends crafted TCP SYN frames and reads the answer off a capture session
//! without completing the handshake.
//!
//! # Privileges Required
//!
//! Opening datalink channels needs root (or CAP_NET_RAW).
//!
//! # How It Works
//!
//! Every task of a scan shares one source port and one transmit handle.
//! Per port:
//!
//! 1. Open a capture session filtered to SYN+ACK / RST+ACK from the port
//! 2. Build and send a SYN frame through the shared transmitter
//! 3. Wait for the answer:
//!    - SYN/ACK: port is open
//!    - RST/ACK: port is closed
//!    - nothing before the deadline: port is filtered
//!
//! A task whose capture or send fails reports `Unknown`; siblings are
//! unaffected.

use crate::capture::{CaptureBackend, CaptureEvent, CaptureFilter, CaptureSession, Transmitter};
use crate::error::{ScanError, ScanResult};
use crate::packet::{self, DecodedFrame};
use crate::resolver::NeighborResolver;
use crate::scanner::traits::{PortState, Prober};
use crate::types::InterfaceDescriptor;
use async_trait::async_trait;
use pnet::util::MacAddr;
use rand::Rng;
use std::net::{IpAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

/// SYN Scanner for half-open port scanning.
///
/// **Requires elevated privileges (root/sudo).**
#[derive(Clone)]
pub struct SynScanner {
    target: IpAddr,
    interface: Arc<InterfaceDescriptor>,
    backend: Arc<dyn CaptureBackend>,
    transmitter: Option<Arc<Transmitter>>,
    source_port: u16,
    next_hop: MacAddr,
    timeout: Duration,
}

impl SynScanner {
    /// Create a SYN scanner sending through `backend`.
    ///
    /// Opens the shared transmit handle and picks the scan's source port.
    /// A transmitter that fails to open is not an error here: every probe
    /// then reports `Unknown`. The next hop starts as broadcast; see
    /// [`resolve_next_hop`](Self::resolve_next_hop).
    pub fn new(
        target: IpAddr,
        interface: InterfaceDescriptor,
        backend: Arc<dyn CaptureBackend>,
        timeout: Duration,
    ) -> Self {
        let transmitter = match Transmitter::open(backend.as_ref()) {
            Ok(transmitter) => Some(Arc::new(transmitter)),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    interface = %interface.name,
                    "failed to open transmit handle"
                );
                None
            }
        };

        Self {
            target,
            interface: Arc::new(interface),
            backend,
            transmitter,
            source_port: local_source_port(),
            next_hop: MacAddr::broadcast(),
            timeout,
        }
    }

    pub fn with_source_port(mut self, port: u16) -> Self {
        self.source_port = port;
        self
    }

    pub fn with_next_hop(mut self, mac: MacAddr) -> Self {
        self.next_hop = mac;
        self
    }

    /// Learn the next-hop MAC for the target. Blocks for up to `arp_timeout`.
    pub fn resolve_next_hop(self, arp_timeout: Duration) -> Self {
        let next_hop = match self.target {
            IpAddr::V4(ip) => {
                NeighborResolver::new(self.backend.as_ref(), &self.interface, arp_timeout)
                    .resolve(ip)
            }
            IpAddr::V6(_) => MacAddr::broadcast(),
        };
        self.with_next_hop(next_hop)
    }

    pub fn source_port(&self) -> u16 {
        self.source_port
    }

    fn probe_blocking(&self, port: u16) -> ScanResult<PortState> {
        let filter = CaptureFilter::SynReply {
            host: self.target,
            port,
        };
        let session = CaptureSession::open(self.backend.as_ref(), filter)?;

        let transmitter = self
            .transmitter
            .as_ref()
            .ok_or_else(|| ScanError::Send("no transmit handle".to_string()))?;
        let probe = packet::build_syn(
            self.target,
            self.source_port,
            port,
            &self.interface,
            self.next_hop,
        )?;
        transmitter
            .send(probe)
            .map_err(|e| ScanError::Send(e.to_string()))?;

        Ok(await_reply(session.wait(self.timeout)))
    }
}

/// Run the SYN state machine over a stream of capture events.
///
/// The first SYN+ACK or RST+ACK decides; a timeout means filtered.
pub fn await_reply(events: impl IntoIterator<Item = CaptureEvent>) -> PortState {
    for event in events {
        match event {
            CaptureEvent::Frame(DecodedFrame::Tcp(segment)) => {
                if let Some(state) = packet::classify_tcp(segment.flags) {
                    return state;
                }
            }
            CaptureEvent::Frame(_) => {}
            CaptureEvent::Timeout => break,
        }
    }
    PortState::Filtered
}

/// Ephemeral port to send every probe of a scan from.
///
/// Borrowed from the OS by binding a loopback listener on port 0; a random
/// port from the dynamic range if that fails.
fn local_source_port() -> u16 {
    let local = TcpListener::bind("127.0.0.1:0").and_then(|listener| listener.local_addr());
    match local {
        Ok(addr) => addr.port(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to get a local port, picking one at random");
            rand::thread_rng().gen_range(49152..65535)
        }
    }
}

#[async_trait]
impl Prober for SynScanner {
    fn target(&self) -> IpAddr {
        self.target
    }

    async fn probe(&self, port: u16) -> PortState {
        let scanner = self.clone();
        let task = tokio::task::spawn_blocking(move || scanner.probe_blocking(port));
        match task.await {
            Ok(Ok(state)) => {
                tracing::debug!(port, %state, "syn probe finished");
                state
            }
            Ok(Err(e)) => {
                tracing::warn!(port, error = %e, "syn probe failed");
                PortState::Unknown
            }
            Err(e) => {
                tracing::warn!(port, error = %e, "syn probe task failed");
                PortState::Unknown
            }
        }
    }
}
