//! Packet codec for probe frames and captured responses.
//!
//! Outgoing frames (SYN probes, ARP requests) are built with pnet's mutable
//! packet views; lengths and checksums are computed while serializing.
//! Captured frames are decoded into [`DecodedFrame`], a tagged variant, so
//! callers match on layers instead of probing for them.

use crate::error::EncodeError;
use crate::scanner::PortState;
use crate::types::InterfaceDescriptor;
use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherType, EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::icmp::destination_unreachable::IcmpCodes;
use pnet::packet::icmp::{IcmpPacket, IcmpTypes};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, Ipv4Packet, MutableIpv4Packet};
use pnet::packet::tcp::{self, MutableTcpPacket, TcpFlags, TcpOption, TcpPacket};
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;
use pnet::util::MacAddr;
use std::net::{IpAddr, Ipv4Addr};

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const IPV4_HEADER_LEN: usize = 20;
/// TCP header carrying a single MSS option.
pub const SYN_TCP_HEADER_LEN: usize = 24;
pub const ARP_PACKET_LEN: usize = 28;
pub const SYN_FRAME_LEN: usize = ETHERNET_HEADER_LEN + IPV4_HEADER_LEN + SYN_TCP_HEADER_LEN;

const PROBE_TTL: u8 = 64;
const PROBE_IP_ID: u16 = 33333;
const PROBE_SEQUENCE: u32 = 123_456_789;
const PROBE_WINDOW: u16 = 1024;
const PROBE_MSS: u16 = 1460;

/// A fully serialized frame, owned by whoever built it until it is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket(Vec<u8>);

impl RawPacket {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for RawPacket {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// TCP control bits relevant to scan classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpControl {
    pub syn: bool,
    pub ack: bool,
    pub rst: bool,
    pub fin: bool,
}

impl TcpControl {
    fn from_packet(tcp: &TcpPacket<'_>) -> Self {
        let flags = tcp.get_flags();
        Self {
            syn: flags & TcpFlags::SYN != 0,
            ack: flags & TcpFlags::ACK != 0,
            rst: flags & TcpFlags::RST != 0,
            fin: flags & TcpFlags::FIN != 0,
        }
    }

    /// Port state implied by a reply carrying these flags, if any.
    ///
    /// SYN+ACK means a listener answered; RST+ACK means the port is closed.
    /// Anything else is not an answer to a SYN probe.
    pub fn verdict(&self) -> Option<PortState> {
        if self.syn && self.ack {
            Some(PortState::Open)
        } else if self.rst && self.ack {
            Some(PortState::Closed)
        } else {
            None
        }
    }
}

/// Port state implied by a TCP reply; `None` means keep waiting.
pub fn classify_tcp(flags: TcpControl) -> Option<PortState> {
    flags.verdict()
}

/// TCP layer of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSegment {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub source_port: u16,
    pub destination_port: u16,
    pub flags: TcpControl,
}

/// ICMP port-unreachable with the UDP header it quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortUnreachable {
    /// Sender of the ICMP message.
    pub source: Ipv4Addr,
    /// Destination of the quoted datagram.
    pub quoted_destination: Ipv4Addr,
    /// Destination port of the quoted datagram.
    pub quoted_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpReply {
    pub sender_ip: Ipv4Addr,
    pub sender_mac: MacAddr,
}

/// A captured frame, decoded as far as scanning cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedFrame {
    Tcp(TcpSegment),
    PortUnreachable(PortUnreachable),
    ArpReply(ArpReply),
    Other,
}

/// Decode an Ethernet frame.
pub fn decode(frame: &[u8]) -> DecodedFrame {
    let Some(ethernet) = EthernetPacket::new(frame) else {
        return DecodedFrame::Other;
    };

    match ethernet.get_ethertype() {
        EtherTypes::Ipv4 => decode_ipv4(ethernet.payload()),
        EtherTypes::Arp => decode_arp(ethernet.payload()),
        _ => DecodedFrame::Other,
    }
}

fn decode_ipv4(bytes: &[u8]) -> DecodedFrame {
    let Some(ip) = Ipv4Packet::new(bytes) else {
        return DecodedFrame::Other;
    };
    let Some(body) = bytes.get(ip.get_header_length() as usize * 4..) else {
        return DecodedFrame::Other;
    };

    match ip.get_next_level_protocol() {
        IpNextHeaderProtocols::Tcp => match TcpPacket::new(body) {
            Some(tcp) => DecodedFrame::Tcp(TcpSegment {
                source: ip.get_source(),
                destination: ip.get_destination(),
                source_port: tcp.get_source(),
                destination_port: tcp.get_destination(),
                flags: TcpControl::from_packet(&tcp),
            }),
            None => DecodedFrame::Other,
        },
        IpNextHeaderProtocols::Icmp => decode_unreachable(ip.get_source(), body)
            .map(DecodedFrame::PortUnreachable)
            .unwrap_or(DecodedFrame::Other),
        _ => DecodedFrame::Other,
    }
}

fn decode_unreachable(source: Ipv4Addr, body: &[u8]) -> Option<PortUnreachable> {
    let icmp = IcmpPacket::new(body)?;
    if icmp.get_icmp_type() != IcmpTypes::DestinationUnreachable
        || icmp.get_icmp_code() != IcmpCodes::DestinationPortUnreachable
    {
        return None;
    }

    // 8 bytes of ICMP header, then the offending IP header and 8 bytes of UDP
    let quoted = body.get(8..)?;
    let inner = Ipv4Packet::new(quoted)?;
    if inner.get_next_level_protocol() != IpNextHeaderProtocols::Udp {
        return None;
    }
    let udp = UdpPacket::new(quoted.get(inner.get_header_length() as usize * 4..)?)?;

    Some(PortUnreachable {
        source,
        quoted_destination: inner.get_destination(),
        quoted_port: udp.get_destination(),
    })
}

fn decode_arp(bytes: &[u8]) -> DecodedFrame {
    match ArpPacket::new(bytes) {
        Some(arp) if arp.get_operation() == ArpOperations::Reply => {
            DecodedFrame::ArpReply(ArpReply {
                sender_ip: arp.get_sender_proto_addr(),
                sender_mac: arp.get_sender_hw_addr(),
            })
        }
        _ => DecodedFrame::Other,
    }
}

fn write_ethernet(
    buffer: &mut [u8],
    destination: MacAddr,
    source: MacAddr,
    ethertype: EtherType,
) -> Result<(), EncodeError> {
    let mut ethernet =
        MutableEthernetPacket::new(buffer).ok_or(EncodeError::BufferTooSmall("ethernet"))?;
    ethernet.set_destination(destination);
    ethernet.set_source(source);
    ethernet.set_ethertype(ethertype);
    Ok(())
}

/// Build a TCP SYN probe addressed through `next_hop`.
pub fn build_syn(
    host: IpAddr,
    source_port: u16,
    destination_port: u16,
    iface: &InterfaceDescriptor,
    next_hop: MacAddr,
) -> Result<RawPacket, EncodeError> {
    let target = match host {
        IpAddr::V4(ip) => ip,
        other => return Err(EncodeError::UnsupportedTarget(other)),
    };
    let source = iface
        .ipv4()
        .ok_or_else(|| EncodeError::NoSourceAddress(iface.name.clone()))?;

    let mut buffer = vec![0u8; SYN_FRAME_LEN];

    write_ethernet(
        &mut buffer[..ETHERNET_HEADER_LEN],
        next_hop,
        iface.source_mac(),
        EtherTypes::Ipv4,
    )?;

    {
        let mut ip = MutableIpv4Packet::new(&mut buffer[ETHERNET_HEADER_LEN..])
            .ok_or(EncodeError::BufferTooSmall("IPv4"))?;
        ip.set_version(4);
        ip.set_header_length((IPV4_HEADER_LEN / 4) as u8);
        ip.set_total_length((IPV4_HEADER_LEN + SYN_TCP_HEADER_LEN) as u16);
        ip.set_identification(PROBE_IP_ID);
        ip.set_ttl(PROBE_TTL);
        ip.set_next_level_protocol(IpNextHeaderProtocols::Tcp);
        ip.set_source(source);
        ip.set_destination(target);
        ip.set_checksum(ipv4::checksum(&ip.to_immutable()));
    }

    {
        let mut tcp = MutableTcpPacket::new(&mut buffer[ETHERNET_HEADER_LEN + IPV4_HEADER_LEN..])
            .ok_or(EncodeError::BufferTooSmall("TCP"))?;
        tcp.set_source(source_port);
        tcp.set_destination(destination_port);
        tcp.set_sequence(PROBE_SEQUENCE);
        tcp.set_acknowledgement(0);
        tcp.set_data_offset((SYN_TCP_HEADER_LEN / 4) as u8);
        tcp.set_flags(TcpFlags::SYN);
        tcp.set_window(PROBE_WINDOW);
        tcp.set_options(&[TcpOption::mss(PROBE_MSS)]);
        let checksum = tcp::ipv4_checksum(&tcp.to_immutable(), &source, &target);
        tcp.set_checksum(checksum);
    }

    Ok(RawPacket(buffer))
}

/// Build a broadcast ARP who-has request for `target`.
pub fn build_arp_request(
    source_mac: MacAddr,
    source_ip: Ipv4Addr,
    target: Ipv4Addr,
) -> Result<RawPacket, EncodeError> {
    let mut buffer = vec![0u8; ETHERNET_HEADER_LEN + ARP_PACKET_LEN];

    write_ethernet(
        &mut buffer[..ETHERNET_HEADER_LEN],
        MacAddr::broadcast(),
        source_mac,
        EtherTypes::Arp,
    )?;

    let mut arp = MutableArpPacket::new(&mut buffer[ETHERNET_HEADER_LEN..])
        .ok_or(EncodeError::BufferTooSmall("ARP"))?;
    arp.set_hardware_type(ArpHardwareTypes::Ethernet);
    arp.set_protocol_type(EtherTypes::Ipv4);
    arp.set_hw_addr_len(6);
    arp.set_proto_addr_len(4);
    arp.set_operation(ArpOperations::Request);
    arp.set_sender_hw_addr(source_mac);
    arp.set_sender_proto_addr(source_ip);
    arp.set_target_hw_addr(MacAddr::zero());
    arp.set_target_proto_addr(target);

    Ok(RawPacket(buffer))
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn eth0() -> InterfaceDescriptor {
        InterfaceDescriptor::new(
            "eth0",
            Some(LOCAL_MAC),
            vec!["192.168.1.10/24".parse().unwrap()],
        )
    }

    const TARGET: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);

    #[test]
    fn test_syn_probe_layout() {
        let packet = build_syn(IpAddr::V4(TARGET), 50000, 443, &eth0(), TARGET_MAC).unwrap();
        assert_eq!(packet.len(), SYN_FRAME_LEN);

        let ethernet = EthernetPacket::new(packet.as_bytes()).unwrap();
        assert_eq!(ethernet.get_destination(), TARGET_MAC);
        assert_eq!(ethernet.get_source(), LOCAL_MAC);
        assert_eq!(ethernet.get_ethertype(), EtherTypes::Ipv4);

        let ip = Ipv4Packet::new(ethernet.payload()).unwrap();
        assert_eq!(ip.get_version(), 4);
        assert_eq!(ip.get_header_length(), 5);
        assert_eq!(ip.get_ttl(), 64);
        assert_eq!(ip.get_identification(), 33333);
        assert_eq!(
            ip.get_total_length() as usize,
            IPV4_HEADER_LEN + SYN_TCP_HEADER_LEN
        );
        assert_eq!(ip.get_source(), Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(ip.get_destination(), TARGET);
        assert_eq!(ip.get_checksum(), ipv4::checksum(&ip));

        let tcp = TcpPacket::new(ip.payload()).unwrap();
        assert_eq!(tcp.get_source(), 50000);
        assert_eq!(tcp.get_destination(), 443);
        assert_eq!(tcp.get_window(), 1024);
        assert_eq!(tcp.get_sequence(), 123_456_789);
        assert_eq!(tcp.get_data_offset(), 6);
        assert_eq!(
            tcp.get_checksum(),
            tcp::ipv4_checksum(&tcp, &Ipv4Addr::new(192, 168, 1, 10), &TARGET)
        );
        // MSS option: kind 2, length 4, 1460
        assert_eq!(&tcp.packet()[20..24], &[2, 4, 0x05, 0xb4]);
    }

    #[test]
    fn test_syn_probe_decodes_as_bare_syn() {
        let packet = build_syn(IpAddr::V4(TARGET), 50000, 22, &eth0(), TARGET_MAC).unwrap();
        let DecodedFrame::Tcp(segment) = decode(packet.as_bytes()) else {
            panic!("expected a TCP frame");
        };
        assert!(segment.flags.syn);
        assert!(!segment.flags.ack);
        assert!(!segment.flags.rst);
        assert_eq!(segment.flags.verdict(), None);
        assert_eq!(segment.destination_port, 22);
    }

    #[test]
    fn test_syn_requires_ipv4() {
        let no_v4 = InterfaceDescriptor::new("tun0", None, vec!["fe80::1/64".parse().unwrap()]);
        assert!(matches!(
            build_syn(IpAddr::V4(TARGET), 1, 2, &no_v4, TARGET_MAC),
            Err(EncodeError::NoSourceAddress(_))
        ));
        assert!(matches!(
            build_syn("::1".parse().unwrap(), 1, 2, &eth0(), TARGET_MAC),
            Err(EncodeError::UnsupportedTarget(_))
        ));
    }

    #[test]
    fn test_syn_without_mac_uses_zero_source() {
        let lo = InterfaceDescriptor::new("lo", None, vec!["127.0.0.1/8".parse().unwrap()]);
        let target = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let packet = build_syn(target, 1, 2, &lo, MacAddr::zero()).unwrap();
        let ethernet = EthernetPacket::new(packet.as_bytes()).unwrap();
        assert_eq!(ethernet.get_source(), MacAddr::zero());
    }

    #[test]
    fn test_synack_classifies_open_with_options() {
        for options in [false, true] {
            let frame = tcp_frame(
                TARGET,
                80,
                Ipv4Addr::new(192, 168, 1, 10),
                50000,
                (TcpFlags::SYN | TcpFlags::ACK) as u8,
                options,
            );
            let DecodedFrame::Tcp(segment) = decode(&frame) else {
                panic!("expected a TCP frame");
            };
            assert_eq!(segment.source, TARGET);
            assert_eq!(segment.source_port, 80);
            assert_eq!(segment.flags.verdict(), Some(PortState::Open));
        }
    }

    #[test]
    fn test_rstack_classifies_closed() {
        let frame = tcp_frame(
            TARGET,
            81,
            Ipv4Addr::new(192, 168, 1, 10),
            50000,
            (TcpFlags::RST | TcpFlags::ACK) as u8,
            false,
        );
        let DecodedFrame::Tcp(segment) = decode(&frame) else {
            panic!("expected a TCP frame");
        };
        assert_eq!(segment.flags.verdict(), Some(PortState::Closed));

        let bare_rst = TcpControl {
            rst: true,
            ..TcpControl::default()
        };
        assert_eq!(bare_rst.verdict(), None);
    }

    #[test]
    fn test_decode_port_unreachable() {
        let local = Ipv4Addr::new(192, 168, 1, 10);
        let frame = port_unreachable_frame(TARGET, local, TARGET, 161);
        assert_eq!(
            decode(&frame),
            DecodedFrame::PortUnreachable(PortUnreachable {
                source: TARGET,
                quoted_destination: TARGET,
                quoted_port: 161,
            })
        );
    }

    #[test]
    fn test_arp_request_and_reply() {
        let request = build_arp_request(
            LOCAL_MAC,
            Ipv4Addr::new(192, 168, 1, 10),
            Ipv4Addr::new(192, 168, 1, 1),
        )
        .unwrap();
        let ethernet = EthernetPacket::new(request.as_bytes()).unwrap();
        assert_eq!(ethernet.get_destination(), MacAddr::broadcast());
        let arp = ArpPacket::new(ethernet.payload()).unwrap();
        assert_eq!(arp.get_operation(), ArpOperations::Request);
        assert_eq!(arp.get_target_proto_addr(), Ipv4Addr::new(192, 168, 1, 1));
        // Requests are not replies
        assert_eq!(decode(request.as_bytes()), DecodedFrame::Other);

        let reply = arp_reply_frame(Ipv4Addr::new(192, 168, 1, 1), TARGET_MAC);
        assert_eq!(
            decode(&reply),
            DecodedFrame::ArpReply(ArpReply {
                sender_ip: Ipv4Addr::new(192, 168, 1, 1),
                sender_mac: TARGET_MAC,
            })
        );
    }

    #[test]
    fn test_truncated_frames_are_other() {
        assert_eq!(decode(&[]), DecodedFrame::Other);
        let packet = build_syn(IpAddr::V4(TARGET), 50000, 22, &eth0(), TARGET_MAC).unwrap();
        assert_eq!(decode(&packet.as_bytes()[..20]), DecodedFrame::Other);
    }
}
