//! Next-hop hardware address resolution for raw frames.
//!
//! Off-link destinations are reached through the default gateway, read from
//! `/proc/net/route`; the hop's MAC is then learned with an ARP exchange on
//! the scan interface. Any failure yields the broadcast address so the scan
//! can still go out.

use crate::capture::{CaptureBackend, CaptureEvent, CaptureFilter, CaptureSession, Transmitter};
use crate::error::ResolveError;
use crate::packet::{self, DecodedFrame};
use crate::types::InterfaceDescriptor;
use pnet::util::MacAddr;
use std::net::Ipv4Addr;
use std::time::Duration;

const ROUTE_TABLE: &str = "/proc/net/route";
const RTF_UP: u32 = 0x1;
const RTF_GATEWAY: u32 = 0x2;

/// Resolves the link-layer address frames to a destination are sent to.
pub struct NeighborResolver<'a> {
    backend: &'a dyn CaptureBackend,
    interface: &'a InterfaceDescriptor,
    timeout: Duration,
}

impl<'a> NeighborResolver<'a> {
    pub fn new(
        backend: &'a dyn CaptureBackend,
        interface: &'a InterfaceDescriptor,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            interface,
            timeout,
        }
    }

    /// Next-hop MAC for `destination`, or broadcast if it cannot be learned.
    pub fn resolve(&self, destination: Ipv4Addr) -> MacAddr {
        if self.interface.mac.is_none() {
            return MacAddr::zero();
        }

        match self.try_resolve(destination) {
            Ok(mac) => {
                tracing::debug!(%destination, %mac, "resolved next hop");
                mac
            }
            Err(e) => {
                tracing::warn!(
                    %destination,
                    error = %e,
                    "next-hop resolution failed, using broadcast"
                );
                MacAddr::broadcast()
            }
        }
    }

    pub fn try_resolve(&self, destination: Ipv4Addr) -> Result<MacAddr, ResolveError> {
        let hop = if self.interface.is_on_link(destination) {
            destination
        } else {
            default_gateway(&self.interface.name)?
        };
        self.arp_exchange(hop)
    }

    fn arp_exchange(&self, target: Ipv4Addr) -> Result<MacAddr, ResolveError> {
        let source_ip = self
            .interface
            .ipv4()
            .ok_or_else(|| ResolveError::NoSourceAddress(self.interface.name.clone()))?;

        let filter = CaptureFilter::ArpReply { sender: target };
        let session = CaptureSession::open(self.backend, filter)?;
        let transmitter = Transmitter::open(self.backend)?;
        let request = packet::build_arp_request(self.interface.source_mac(), source_ip, target)
            .map_err(|e| ResolveError::Send(e.to_string()))?;
        transmitter
            .send(request)
            .map_err(|e| ResolveError::Send(e.to_string()))?;

        for event in session.wait(self.timeout) {
            match event {
                CaptureEvent::Frame(DecodedFrame::ArpReply(reply)) => return Ok(reply.sender_mac),
                CaptureEvent::Frame(_) => continue,
                CaptureEvent::Timeout => break,
            }
        }
        Err(ResolveError::Timeout(target))
    }
}

/// Default gateway of `interface` from the kernel routing table.
pub fn default_gateway(interface: &str) -> Result<Ipv4Addr, ResolveError> {
    let content = std::fs::read_to_string(ROUTE_TABLE)?;
    parse_default_gateway(&content, interface).ok_or(ResolveError::NoGateway)
}

/// First route through `interface` with destination 0.0.0.0 and both
/// RTF_UP and RTF_GATEWAY set.
///
/// The gateway column is the address as stored in host memory, which is
/// little-endian on every platform that exposes this file in practice.
fn parse_default_gateway(content: &str, interface: &str) -> Option<Ipv4Addr> {
    content.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[0] != interface || fields[1] != "00000000" {
            return None;
        }
        let flags = u32::from_str_radix(fields[3], 16).ok()?;
        if flags & (RTF_UP | RTF_GATEWAY) != (RTF_UP | RTF_GATEWAY) {
            return None;
        }
        let gateway = u32::from_str_radix(fields[2], 16).ok()?;
        Some(Ipv4Addr::from(gateway.to_le_bytes()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::scripted::{Script, ScriptedBackend};
    use crate::packet::testing::{arp_reply_frame, LOCAL_MAC, TARGET_MAC};
    use pnet::packet::arp::ArpPacket;
    use pnet::packet::ethernet::EthernetPacket;
    use pnet::packet::Packet;

    const ROUTES: &str = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
eth0\t0001A8C0\t00000000\t0001\t0\t0\t0\t00FFFFFF\t0\t0\t0
eth0\t00000000\t0101A8C0\t0003\t0\t0\t100\t00000000\t0\t0\t0
";

    fn eth0() -> InterfaceDescriptor {
        InterfaceDescriptor::new(
            "eth0",
            Some(LOCAL_MAC),
            vec!["192.168.1.10/24".parse().unwrap()],
        )
    }

    #[test]
    fn test_parse_default_gateway() {
        assert_eq!(
            parse_default_gateway(ROUTES, "eth0"),
            Some(Ipv4Addr::new(192, 168, 1, 1))
        );
        assert_eq!(parse_default_gateway(ROUTES, "wlan0"), None);
    }

    #[test]
    fn test_gateway_of_selected_interface() {
        let routes = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
wlan0\t00000000\t0100000A\t0003\t0\t0\t600\t00000000\t0\t0\t0
eth0\t00000000\t0101A8C0\t0003\t0\t0\t100\t00000000\t0\t0\t0
";
        assert_eq!(
            parse_default_gateway(routes, "eth0"),
            Some(Ipv4Addr::new(192, 168, 1, 1))
        );
        assert_eq!(
            parse_default_gateway(routes, "wlan0"),
            Some(Ipv4Addr::new(10, 0, 0, 1))
        );
    }

    #[test]
    fn test_parse_no_default_route() {
        let only_link = "Iface\tDestination\tGateway\tFlags\n\
                         eth0\t0001A8C0\t00000000\t0001\n";
        assert_eq!(parse_default_gateway(only_link, "eth0"), None);
        // default route that is down
        let down = "Iface\tDestination\tGateway\tFlags\n\
                    eth0\t00000000\t0101A8C0\t0002\n";
        assert_eq!(parse_default_gateway(down, "eth0"), None);
    }

    #[test]
    fn test_on_link_destination_resolved_by_arp() {
        let neighbor = Ipv4Addr::new(192, 168, 1, 20);
        let backend = ScriptedBackend::new(move |filter, _| match filter {
            CaptureFilter::ArpReply { sender } if *sender == neighbor => {
                Script::Frames(vec![arp_reply_frame(neighbor, TARGET_MAC)])
            }
            _ => Script::Silent,
        });
        let iface = eth0();
        let resolver = NeighborResolver::new(&backend, &iface, Duration::from_millis(200));

        assert_eq!(resolver.resolve(neighbor), TARGET_MAC);

        let sent = backend.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let ethernet = EthernetPacket::new(&sent[0]).unwrap();
        let arp = ArpPacket::new(ethernet.payload()).unwrap();
        assert_eq!(arp.get_target_proto_addr(), neighbor);
        assert_eq!(arp.get_sender_proto_addr(), Ipv4Addr::new(192, 168, 1, 10));
    }

    #[test]
    fn test_silence_falls_back_to_broadcast() {
        let backend = ScriptedBackend::new(|_, _| Script::Silent);
        let iface = eth0();
        let resolver = NeighborResolver::new(&backend, &iface, Duration::from_millis(30));

        let neighbor = Ipv4Addr::new(192, 168, 1, 20);
        assert!(matches!(
            resolver.try_resolve(neighbor),
            Err(ResolveError::Timeout(ip)) if ip == neighbor
        ));
        assert_eq!(resolver.resolve(neighbor), MacAddr::broadcast());
    }

    #[test]
    fn test_capture_failure_falls_back_to_broadcast() {
        let backend = ScriptedBackend::new(|_, _| Script::Fail);
        let iface = eth0();
        let resolver = NeighborResolver::new(&backend, &iface, Duration::from_millis(30));
        assert_eq!(
            resolver.resolve(Ipv4Addr::new(192, 168, 1, 20)),
            MacAddr::broadcast()
        );
    }

    #[test]
    fn test_macless_link_uses_zero_address() {
        let backend = ScriptedBackend::new(|_, _| Script::Fail);
        let lo = InterfaceDescriptor::new("lo", None, vec!["127.0.0.1/8".parse().unwrap()]);
        let resolver = NeighborResolver::new(&backend, &lo, Duration::from_millis(30));
        assert_eq!(resolver.resolve(Ipv4Addr::LOCALHOST), MacAddr::zero());
    }
}
