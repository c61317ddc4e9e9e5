use std::net::Ipv6Addr;

use log::warn;
use pnet::packet::ethernet::EtherTypes;
use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::packet::ipv6::{Ipv6Packet, MutableIpv6Packet};

use crate::checksum::PseudoHeader;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::layer2::Layer2;
use crate::protocols::NetworkLayer;

/// Size of the fixed IPv6 header.
pub const IPV6_HEADER_SIZE: usize = 40;

/// IPv6 network layer. Extension headers are not parsed.
#[derive(Clone)]
pub struct Ip6 {
    layer2: Layer2,
    header: [u8; IPV6_HEADER_SIZE],
}

impl Ip6 {
    /// IPv6 over a libpcap device, with an Ethernet transmitter bound to it.
    pub fn new(destination: Ipv6Addr, config: Config) -> Self {
        Self::with_layer2(destination, Layer2::ethernet(config))
    }

    pub fn with_layer2(destination: Ipv6Addr, layer2: Layer2) -> Self {
        let mut ip6 = Ip6 {
            layer2,
            header: [0u8; IPV6_HEADER_SIZE],
        };
        ip6.reset_header();
        ip6.set_dst(destination);
        ip6
    }

    fn view(&self) -> Ipv6Packet<'_> {
        Ipv6Packet::new(&self.header).unwrap()
    }

    fn view_mut(&mut self) -> MutableIpv6Packet<'_> {
        MutableIpv6Packet::new(&mut self.header).unwrap()
    }

    /// Restore the default header, keeping the addresses and the next header.
    pub fn reset_header(&mut self) {
        let source = self.get_src();
        let destination = self.get_dst();
        let next_header = self.get_next_header();
        self.header = [0u8; IPV6_HEADER_SIZE];
        let mut ip = self.view_mut();
        ip.set_version(6);
        ip.set_hop_limit(64);
        ip.set_next_header(next_header);
        ip.set_source(source);
        ip.set_destination(destination);
    }

    /// The raw header, in network byte order.
    pub fn raw_header(&self) -> &[u8; IPV6_HEADER_SIZE] {
        &self.header
    }

    pub fn get_src(&self) -> Ipv6Addr {
        self.view().get_source()
    }

    pub fn set_src(&mut self, addr: Ipv6Addr) -> Ipv6Addr {
        self.view_mut().set_source(addr);
        addr
    }

    pub fn get_dst(&self) -> Ipv6Addr {
        self.view().get_destination()
    }

    pub fn set_dst(&mut self, addr: Ipv6Addr) -> Ipv6Addr {
        self.view_mut().set_destination(addr);
        addr
    }

    pub fn get_hoplimit(&self) -> u8 {
        self.view().get_hop_limit()
    }

    pub fn set_hoplimit(&mut self, hop_limit: u8) -> u8 {
        self.view_mut().set_hop_limit(hop_limit);
        hop_limit
    }

    pub fn get_traffic_class(&self) -> u8 {
        self.view().get_traffic_class()
    }

    pub fn set_traffic_class(&mut self, traffic_class: u8) -> u8 {
        self.view_mut().set_traffic_class(traffic_class);
        traffic_class
    }

    /// Flow label (20 bits).
    pub fn get_flowlabel(&self) -> u32 {
        self.view().get_flow_label()
    }

    pub fn set_flowlabel(&mut self, flow_label: u32) -> u32 {
        let flow_label = flow_label & 0x000f_ffff;
        self.view_mut().set_flow_label(flow_label);
        flow_label
    }

    pub fn get_next_header(&self) -> IpNextHeaderProtocol {
        self.view().get_next_header()
    }

    pub fn set_next_header(&mut self, next_header: IpNextHeaderProtocol) -> IpNextHeaderProtocol {
        self.view_mut().set_next_header(next_header);
        next_header
    }

    pub fn get_payloadlen(&self) -> u16 {
        self.view().get_payload_length()
    }
}

impl NetworkLayer for Ip6 {
    const NAME: &'static str = "IPv6";

    type Snapshot = [u8; IPV6_HEADER_SIZE];

    fn layer2(&self) -> &Layer2 {
        &self.layer2
    }

    fn layer2_mut(&mut self) -> &mut Layer2 {
        &mut self.layer2
    }

    fn header_size(&self) -> usize {
        IPV6_HEADER_SIZE
    }

    fn write_header(&mut self, buffer: &mut [u8], upper_size: usize) -> Result<()> {
        if upper_size > u16::MAX as usize {
            return Err(Error::Size {
                layer: Self::NAME,
                size: upper_size,
                max: u16::MAX as usize,
            });
        }
        self.view_mut().set_payload_length(upper_size as u16);
        buffer.copy_from_slice(&self.header);
        Ok(())
    }

    fn pseudo_header(&self) -> PseudoHeader {
        PseudoHeader::V6 {
            source: self.get_src(),
            destination: self.get_dst(),
            next_header: self.get_next_header(),
        }
    }

    fn snapshot(&self) -> Self::Snapshot {
        self.header
    }

    fn restore(&mut self, header: Self::Snapshot) {
        self.header = header;
    }

    fn set_protocol(&mut self, protocol: IpNextHeaderProtocol) {
        self.set_next_header(protocol);
    }

    fn init_device(&mut self, device: &str, promiscuous: bool, snaplen: usize) -> Result<()> {
        self.layer2.init_device(device, promiscuous, snaplen)?;
        // Keep a narrower filter installed by an upper layer.
        if self.layer2.filter().is_none() {
            self.layer2.set_filter("ip6")?;
        }
        self.layer2.raw_tx_mut().set_frame_type(EtherTypes::Ipv6);
        Ok(())
    }

    fn sniffpack(&mut self, buffer: &mut [u8], offset: &mut usize) -> Result<usize> {
        let size = self.layer2.sniffpack(buffer, offset)?;
        if size == 0 && self.layer2.timed_out() {
            return Ok(0);
        }

        let start = *offset;
        let header = buffer
            .get(start..size)
            .and_then(|data| data.get(..IPV6_HEADER_SIZE))
            .ok_or_else(|| {
                warn!("IPv6: short packet size={} offset={}", size, start);
                Error::Framing {
                    layer: Self::NAME,
                    available: size,
                    required: start + IPV6_HEADER_SIZE,
                }
            })?;
        self.header.copy_from_slice(header);
        *offset = start + IPV6_HEADER_SIZE;

        // Drop the link-layer padding of short frames.
        let end = *offset + self.get_payloadlen() as usize;
        Ok(end.min(size))
    }
}
