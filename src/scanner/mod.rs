//! Scanner module - coordinates different scanning techniques.
//!
//! Every mode follows the same shape: one task per port, bounded by a
//! semaphore, reporting its verdict through an mpsc queue that the
//! dispatcher drains until every task is done.

pub mod syn;
pub mod tcp;
pub mod traits;
pub mod udp;

use crate::capture::{CaptureBackend, LiveCapture};
use crate::config::ScanSettings;
use crate::error::{ScanError, ScanResult};
use crate::output::ScanReport;
use crate::types::ScanRequest;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};

pub use syn::SynScanner;
pub use tcp::TcpConnectScanner;
pub use traits::{PortState, Prober, ScanMode, ScanVerdict};
pub use udp::{DatagramSender, UdpScanner, UdpSocketSender};

/// Probe every port concurrently and collect the verdicts.
///
/// Returns one verdict per port in completion order. A task that dies
/// without reporting leaves its port `Unknown`.
pub(crate) async fn fan_out<P>(
    prober: Arc<P>,
    ports: &[u16],
    limit: Arc<Semaphore>,
) -> Vec<ScanVerdict>
where
    P: Prober + ?Sized + 'static,
{
    let host = prober.target();
    let (tx, mut rx) = mpsc::channel(ports.len().max(1));

    for &port in ports {
        let tx = tx.clone();
        let prober = Arc::clone(&prober);
        let limit = Arc::clone(&limit);

        tokio::spawn(async move {
            // a closed semaphore still lets the probe run
            let _permit = limit.acquire_owned().await.ok();
            let state = prober.probe(port).await;
            let _ = tx.send(ScanVerdict::new(host, port, state)).await;
        });
    }
    drop(tx);

    let mut verdicts = Vec::with_capacity(ports.len());
    while let Some(verdict) = rx.recv().await {
        verdicts.push(verdict);
    }

    if verdicts.len() < ports.len() {
        let seen: HashSet<u16> = verdicts.iter().map(|v| v.port).collect();
        for &port in ports {
            if !seen.contains(&port) {
                tracing::warn!(port, "probe task vanished");
                verdicts.push(ScanVerdict::unknown(host, port));
            }
        }
    }

    verdicts
}

/// Execute a complete port scan against the request's selected host.
pub async fn run_scan(request: &ScanRequest, settings: &ScanSettings) -> ScanResult<ScanReport> {
    let start_time = Instant::now();
    let host = request.selected_host()?;
    let mode = request.mode();
    let ports = request.ports();

    tracing::info!(
        %host,
        %mode,
        ports = ports.len(),
        interface = %request.interface().name,
        "starting scan"
    );

    let verdicts = match mode {
        ScanMode::Connect => {
            let scanner = Arc::new(TcpConnectScanner::new(host, settings.tcp_timeout()));
            let limit = Arc::new(Semaphore::new(settings.tcp_concurrency));
            fan_out(scanner, ports, limit).await
        }
        ScanMode::Syn => {
            let backend: Arc<dyn CaptureBackend> = Arc::new(LiveCapture::new(
                request.interface(),
                settings.capture_read_timeout(),
            )?);
            let interface = request.interface().clone();
            let (syn_timeout, arp_timeout) = (settings.syn_timeout(), settings.arp_timeout());

            // next-hop resolution blocks on an ARP exchange
            let scanner = tokio::task::spawn_blocking(move || {
                SynScanner::new(host, interface, backend, syn_timeout)
                    .resolve_next_hop(arp_timeout)
            })
            .await
            .map_err(|e| ScanError::Io(std::io::Error::other(e)))?;
            tracing::debug!(source_port = scanner.source_port(), "syn scanner ready");

            let limit = Arc::new(Semaphore::new(settings.max_capture_sessions));
            fan_out(Arc::new(scanner), ports, limit).await
        }
        ScanMode::Udp => {
            let backend: Arc<dyn CaptureBackend> = Arc::new(LiveCapture::new(
                request.interface(),
                settings.capture_read_timeout(),
            )?);
            let sender: Arc<dyn DatagramSender> = Arc::new(UdpSocketSender::bind(host)?);
            let scanner = UdpScanner::new(host, backend, sender, settings.udp_timeout())
                .with_batching(settings.udp_batch_size, settings.udp_retries);

            let limit = Arc::new(Semaphore::new(settings.max_capture_sessions));
            scanner.scan(ports, limit).await
        }
    };

    tracing::info!(
        %host,
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "scan complete"
    );

    Ok(ScanReport::new(host, mode, ports, verdicts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InterfaceDescriptor;
    use async_trait::async_trait;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::net::TcpListener;

    struct Panicky;

    #[async_trait]
    impl Prober for Panicky {
        fn target(&self) -> IpAddr {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }

        async fn probe(&self, port: u16) -> PortState {
            if port == 13 {
                panic!("probe exploded");
            }
            PortState::Closed
        }
    }

    struct Counting {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Prober for Counting {
        fn target(&self) -> IpAddr {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }

        async fn probe(&self, _port: u16) -> PortState {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            PortState::Open
        }
    }

    #[tokio::test]
    async fn test_fan_out_fills_vanished_tasks() {
        let limit = Arc::new(Semaphore::new(4));
        let mut verdicts = fan_out(Arc::new(Panicky), &[12, 13, 14], limit).await;
        verdicts.sort_by_key(|v| v.port);

        let states: Vec<PortState> = verdicts.iter().map(|v| v.state).collect();
        assert_eq!(
            states,
            vec![PortState::Closed, PortState::Unknown, PortState::Closed]
        );
    }

    #[tokio::test]
    async fn test_fan_out_respects_limit() {
        let prober = Arc::new(Counting {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let ports: Vec<u16> = (1..=20).collect();

        let limit = Arc::new(Semaphore::new(3));
        let verdicts = fan_out(Arc::clone(&prober), &ports, limit).await;
        assert_eq!(verdicts.len(), 20);
        assert!(prober.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_connect_scan_report() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = {
            let spare = TcpListener::bind("127.0.0.1:0").await.unwrap();
            spare.local_addr().unwrap().port()
        };

        let request = ScanRequest::new(
            vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
            [open, closed],
            ScanMode::Connect,
            InterfaceDescriptor::new("lo", None, vec!["127.0.0.1/8".parse().unwrap()]),
        );
        let report = run_scan(&request, &ScanSettings::default()).await.unwrap();

        let state_of = |port: u16| {
            report
                .verdicts()
                .iter()
                .find(|v| v.port == port)
                .map(|v| v.state)
        };
        assert_eq!(report.verdicts().len(), 2);
        assert_eq!(state_of(open), Some(PortState::Open));
        assert_eq!(state_of(closed), Some(PortState::Closed));
    }

    #[tokio::test]
    async fn test_empty_request_has_no_host() {
        let request = ScanRequest::new(
            Vec::new(),
            [80],
            ScanMode::Connect,
            InterfaceDescriptor::new("lo", None, Vec::new()),
        );
        assert!(matches!(
            run_scan(&request, &ScanSettings::default()).await,
            Err(ScanError::NoHosts)
        ));
    }
}
