//! The validated scan request handed to the scanning core.

use crate::error::ScanResult;
use crate::scanner::ScanMode;
use crate::types::{select_host, InterfaceDescriptor};
use std::net::IpAddr;

/// Everything a scan needs: where, which ports, how, and through which
/// interface. Immutable once built.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    hosts: Vec<IpAddr>,
    ports: Vec<u16>,
    mode: ScanMode,
    interface: InterfaceDescriptor,
}

impl ScanRequest {
    /// Build a request. Ports are sorted and deduplicated.
    pub fn new(
        hosts: Vec<IpAddr>,
        ports: impl IntoIterator<Item = u16>,
        mode: ScanMode,
        interface: InterfaceDescriptor,
    ) -> Self {
        let mut ports: Vec<u16> = ports.into_iter().collect();
        ports.sort_unstable();
        ports.dedup();

        Self {
            hosts,
            ports,
            mode,
            interface,
        }
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn interface(&self) -> &InterfaceDescriptor {
        &self.interface
    }

    /// The one address this scan probes.
    pub fn selected_host(&self) -> ScanResult<IpAddr> {
        select_host(&self.hosts)
    }
}
