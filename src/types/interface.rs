//! Network interface selection.

use crate::error::CaptureError;
use pnet::datalink::{self, NetworkInterface};
use pnet::ipnetwork::{IpNetwork, Ipv4Network};
use pnet::util::MacAddr;
use std::fmt;
use std::net::Ipv4Addr;

/// The interface a scan sends and captures on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    /// Interface name, e.g. `eth0`.
    pub name: String,
    /// Hardware address; `None` on links without one (loopback, tun).
    pub mac: Option<MacAddr>,
    /// Bound addresses with their prefixes.
    pub ips: Vec<IpNetwork>,
}

impl InterfaceDescriptor {
    pub fn new(name: impl Into<String>, mac: Option<MacAddr>, ips: Vec<IpNetwork>) -> Self {
        Self {
            name: name.into(),
            mac,
            ips,
        }
    }

    /// First bound IPv4 address.
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.ipv4_networks().next().map(|net| net.ip())
    }

    pub fn ipv4_networks(&self) -> impl Iterator<Item = Ipv4Network> + '_ {
        self.ips.iter().filter_map(|net| match net {
            IpNetwork::V4(v4) => Some(*v4),
            IpNetwork::V6(_) => None,
        })
    }

    /// Whether `ip` lies inside one of the interface's IPv4 networks.
    pub fn is_on_link(&self, ip: Ipv4Addr) -> bool {
        self.ipv4_networks().any(|net| net.contains(ip))
    }

    /// Hardware address to put in outgoing frames.
    pub fn source_mac(&self) -> MacAddr {
        self.mac.unwrap_or_else(MacAddr::zero)
    }

    /// Look up the live pnet interface with this name.
    pub fn to_network_interface(&self) -> Result<NetworkInterface, CaptureError> {
        datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == self.name)
            .ok_or_else(|| CaptureError::InterfaceNotFound(self.name.clone()))
    }
}

impl From<&NetworkInterface> for InterfaceDescriptor {
    fn from(iface: &NetworkInterface) -> Self {
        Self::new(iface.name.clone(), iface.mac, iface.ips.clone())
    }
}

impl fmt::Display for InterfaceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ipv4() {
            Some(ip) => write!(f, "{} ({})", self.name, ip),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Find the interface to scan from.
///
/// An explicit name must exist. Otherwise the last interface that is up
/// and has an address wins, with loopback only as a last resort.
pub fn select_interface(name: Option<&str>) -> Result<InterfaceDescriptor, CaptureError> {
    pick_interface(&datalink::interfaces(), name).map(InterfaceDescriptor::from)
}

fn pick_interface<'a>(
    interfaces: &'a [NetworkInterface],
    name: Option<&str>,
) -> Result<&'a NetworkInterface, CaptureError> {
    if let Some(name) = name {
        return interfaces
            .iter()
            .find(|iface| iface.name == name)
            .ok_or_else(|| CaptureError::InterfaceNotFound(name.to_string()));
    }

    let usable = |iface: &&NetworkInterface| iface.is_running() && !iface.ips.is_empty();
    interfaces
        .iter()
        .rev()
        .filter(usable)
        .find(|iface| !iface.is_loopback())
        .or_else(|| interfaces.iter().rev().find(usable))
        .ok_or_else(|| CaptureError::InterfaceNotFound("no running interface found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, flags: u32, ips: &[&str]) -> NetworkInterface {
        NetworkInterface {
            name: name.to_string(),
            description: String::new(),
            index: 1,
            mac: Some(MacAddr::new(0x02, 0, 0, 0, 0, 1)),
            ips: ips.iter().map(|s| s.parse().unwrap()).collect(),
            flags,
        }
    }

    const UP: u32 = libc::IFF_UP as u32;
    const RUNNING: u32 = libc::IFF_RUNNING as u32;
    const LOOPBACK: u32 = libc::IFF_LOOPBACK as u32;

    #[test]
    fn test_pick_by_name() {
        let all = vec![
            iface("lo", UP | RUNNING | LOOPBACK, &["127.0.0.1/8"]),
            iface("eth0", UP, &[]),
        ];
        assert_eq!(pick_interface(&all, Some("eth0")).unwrap().name, "eth0");
        assert!(matches!(
            pick_interface(&all, Some("wlan9")),
            Err(CaptureError::InterfaceNotFound(_))
        ));
    }

    #[test]
    fn test_pick_prefers_non_loopback() {
        let all = vec![
            iface("lo", UP | RUNNING | LOOPBACK, &["127.0.0.1/8"]),
            iface("eth0", UP | RUNNING, &["192.168.1.10/24"]),
            iface("eth1", 0, &["10.0.0.2/8"]),
        ];
        assert_eq!(pick_interface(&all, None).unwrap().name, "eth0");
    }

    #[test]
    fn test_pick_skips_up_without_carrier() {
        // eth1 is administratively up but has no link
        let all = vec![
            iface("lo", UP | RUNNING | LOOPBACK, &["127.0.0.1/8"]),
            iface("eth0", UP | RUNNING, &["192.168.1.10/24"]),
            iface("eth1", UP, &["10.0.0.2/8"]),
        ];
        assert_eq!(pick_interface(&all, None).unwrap().name, "eth0");

        let cable_out = vec![
            iface("lo", UP | RUNNING | LOOPBACK, &["127.0.0.1/8"]),
            iface("eth0", UP, &["192.168.1.10/24"]),
        ];
        assert_eq!(pick_interface(&cable_out, None).unwrap().name, "lo");
    }

    #[test]
    fn test_pick_loopback_last_resort() {
        let all = vec![
            iface("lo", UP | RUNNING | LOOPBACK, &["127.0.0.1/8"]),
            iface("eth0", 0, &[]),
        ];
        assert_eq!(pick_interface(&all, None).unwrap().name, "lo");
    }

    #[test]
    fn test_descriptor_addresses() {
        let eth0 = iface("eth0", UP | RUNNING, &["fe80::1/64", "192.168.1.10/24"]);
        let desc = InterfaceDescriptor::from(&eth0);
        assert_eq!(desc.ipv4(), Some(Ipv4Addr::new(192, 168, 1, 10)));
        assert!(desc.is_on_link(Ipv4Addr::new(192, 168, 1, 1)));
        assert!(!desc.is_on_link(Ipv4Addr::new(8, 8, 8, 8)));
    }
}
