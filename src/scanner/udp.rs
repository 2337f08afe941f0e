//! UDP Scanner implementation.
//!
//! Sends a datagram to each port and listens for ICMP port-unreachable.
//! UDP gives no positive answer, so silence is ambiguous: the port is
//! either open or the datagram was filtered.
//!
//! # Detection
//!
//! 1. **ICMP Port Unreachable**: port is closed, and leaves the retry set
//! 2. **No Response**: port is open or filtered; probed again next round
//!
//! Ports are scanned in fixed-size batches. Within a batch every pending
//! port is probed concurrently, then the batch waits for the round to
//! finish before re-probing the silent ones.
//!
//! # Privileges
//!
//! Root/sudo privileges are required to capture ICMP messages.

use crate::capture::{CaptureBackend, CaptureEvent, CaptureFilter, CaptureSession};
use crate::error::{EncodeError, ScanError, ScanResult};
use crate::scanner::fan_out;
use crate::scanner::traits::{PortState, Prober, ScanVerdict};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Known UDP service probes for better detection.
struct UdpProbe {
    port: u16,
    payload: &'static [u8],
}

/// Common UDP service probes.
const UDP_PROBES: &[UdpProbe] = &[
    // DNS query for version.bind
    UdpProbe {
        port: 53,
        payload: b"\x00\x00\x10\x00\x00\x00\x00\x00\x00\x00\x00\x00",
    },
    // NTP version request
    UdpProbe {
        port: 123,
        payload: b"\xe3\x00\x04\xfa\x00\x01\x00\x00\x00\x01\x00\x00",
    },
    // SNMP get-request
    UdpProbe {
        port: 161,
        payload: b"\x30\x26\x02\x01\x01\x04\x06public\xa0\x19\x02\x04",
    },
    // TFTP read request
    UdpProbe {
        port: 69,
        payload: b"\x00\x01test\x00netascii\x00",
    },
    // NetBIOS name query
    UdpProbe {
        port: 137,
        payload: b"\x80\xf0\x00\x10\x00\x01\x00\x00\x00\x00\x00\x00\
                   \x20CKAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA\x00\x00\x21\x00\x01",
    },
];

/// Payload for ports without a service probe.
const DEFAULT_PROBE: &[u8] = b"test";

/// Get the appropriate probe payload for a port.
fn get_probe_for_port(port: u16) -> &'static [u8] {
    UDP_PROBES
        .iter()
        .find(|p| p.port == port)
        .map(|p| p.payload)
        .unwrap_or(DEFAULT_PROBE)
}

/// Sends one datagram to a remote port.
pub trait DatagramSender: Send + Sync {
    fn send_datagram(&self, destination: SocketAddr, payload: &[u8]) -> io::Result<()>;
}

/// Unconnected OS socket used for every datagram of a scan.
pub struct UdpSocketSender {
    socket: UdpSocket,
}

impl UdpSocketSender {
    /// Bind an ephemeral socket of the same family as `target`.
    pub fn bind(target: IpAddr) -> io::Result<Self> {
        let local = match target {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        Ok(Self {
            socket: UdpSocket::bind(local)?,
        })
    }
}

impl DatagramSender for UdpSocketSender {
    fn send_datagram(&self, destination: SocketAddr, payload: &[u8]) -> io::Result<()> {
        self.socket.send_to(payload, destination).map(|_| ())
    }
}

/// UDP Scanner.
#[derive(Clone)]
pub struct UdpScanner {
    target: IpAddr,
    backend: Arc<dyn CaptureBackend>,
    sender: Arc<dyn DatagramSender>,
    timeout: Duration,
    batch_size: usize,
    retries: u32,
}

impl UdpScanner {
    /// Create a UDP scanner with six ports per batch and three retries.
    ///
    /// # Arguments
    /// * `target` - Target IP address
    /// * `backend` - Link to capture ICMP replies on
    /// * `sender` - Where datagrams are sent from
    /// * `timeout` - How long each probe listens for ICMP
    pub fn new(
        target: IpAddr,
        backend: Arc<dyn CaptureBackend>,
        sender: Arc<dyn DatagramSender>,
        timeout: Duration,
    ) -> Self {
        Self {
            target,
            backend,
            sender,
            timeout,
            batch_size: 6,
            retries: 3,
        }
    }

    /// Override batch size (at least one) and extra rounds per batch.
    pub fn with_batching(mut self, batch_size: usize, retries: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self.retries = retries;
        self
    }

    /// Scan `ports` batch by batch; one verdict per port.
    ///
    /// Only ICMP (IPv4) port-unreachable is decoded, so a non-IPv4 target
    /// gets `Unknown` for every port without probing.
    pub async fn scan(&self, ports: &[u16], limit: Arc<Semaphore>) -> Vec<ScanVerdict> {
        if !self.target.is_ipv4() {
            tracing::warn!(target = %self.target, "udp scanning needs an IPv4 target");
            return ports
                .iter()
                .map(|&port| ScanVerdict::unknown(self.target, port))
                .collect();
        }

        let prober = Arc::new(self.clone());
        let mut verdicts = Vec::with_capacity(ports.len());

        for (index, batch) in ports.chunks(self.batch_size).enumerate() {
            tracing::debug!(batch = index, ports = ?batch, "udp batch");
            verdicts.extend(self.scan_batch(&prober, batch, &limit).await);
        }

        verdicts
    }

    async fn scan_batch(
        &self,
        prober: &Arc<UdpScanner>,
        batch: &[u16],
        limit: &Arc<Semaphore>,
    ) -> Vec<ScanVerdict> {
        let mut states: BTreeMap<u16, PortState> =
            batch.iter().map(|&port| (port, PortState::Unknown)).collect();
        let mut pending: Vec<u16> = states.keys().copied().collect();

        for round in 0..=self.retries {
            if pending.is_empty() {
                break;
            }
            tracing::debug!(round, pending = ?pending, "udp round");

            let results = fan_out(Arc::clone(prober), &pending, Arc::clone(limit)).await;
            pending.clear();

            for verdict in results {
                match verdict.state {
                    PortState::Closed => {
                        states.insert(verdict.port, PortState::Closed);
                    }
                    // keep whatever an earlier round established
                    PortState::Unknown => pending.push(verdict.port),
                    state => {
                        states.insert(verdict.port, state);
                        pending.push(verdict.port);
                    }
                }
            }
            pending.sort_unstable();
        }

        states
            .into_iter()
            .map(|(port, state)| ScanVerdict::new(self.target, port, state))
            .collect()
    }

    fn probe_blocking(&self, port: u16) -> ScanResult<PortState> {
        if !self.target.is_ipv4() {
            return Err(EncodeError::UnsupportedTarget(self.target).into());
        }

        let filter = CaptureFilter::PortUnreachable {
            host: self.target,
            port,
        };
        let session = CaptureSession::open(self.backend.as_ref(), filter)?;

        self.sender
            .send_datagram(SocketAddr::new(self.target, port), get_probe_for_port(port))
            .map_err(|e| ScanError::Send(e.to_string()))?;

        // the session only surfaces port-unreachable frames for this port
        let state = match session.wait(self.timeout).next() {
            Some(CaptureEvent::Frame(_)) => PortState::Closed,
            _ => PortState::OpenOrFiltered,
        };
        Ok(state)
    }
}

#[async_trait]
impl Prober for UdpScanner {
    fn target(&self) -> IpAddr {
        self.target
    }

    async fn probe(&self, port: u16) -> PortState {
        let scanner = self.clone();
        match tokio::task::spawn_blocking(move || scanner.probe_blocking(port)).await {
            Ok(Ok(state)) => {
                tracing::debug!(port, %state, "udp probe finished");
                state
            }
            Ok(Err(e)) => {
                tracing::warn!(port, error = %e, "udp probe failed");
                PortState::Unknown
            }
            Err(e) => {
                tracing::warn!(port, error = %e, "udp probe task failed");
                PortState::Unknown
            }
        }
    }
}
