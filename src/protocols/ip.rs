use std::net::Ipv4Addr;

use log::warn;
use pnet::packet::ethernet::EtherTypes;
use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::packet::ipv4::{Ipv4Packet, MutableIpv4Packet};
use rand::{thread_rng, Rng};

use crate::checksum::{internet_checksum, PseudoHeader};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::layer2::Layer2;
use crate::protocols::NetworkLayer;

/// Size of an IPv4 header without options.
pub const IPV4_HEADER_SIZE: usize = 20;

/// IPv4 network layer.
///
/// Options are neither sent nor kept: captured headers are copied without
/// them, and the offset is advanced past them.
#[derive(Clone)]
pub struct Ip {
    layer2: Layer2,
    header: [u8; IPV4_HEADER_SIZE],
    explicit_checksum: bool,
}

impl Ip {
    /// IPv4 over a libpcap device, with an Ethernet transmitter bound to it.
    pub fn new(destination: Ipv4Addr, config: Config) -> Self {
        Self::with_layer2(destination, Layer2::ethernet(config))
    }

    pub fn with_layer2(destination: Ipv4Addr, layer2: Layer2) -> Self {
        let mut ip = Ip {
            layer2,
            header: [0u8; IPV4_HEADER_SIZE],
            explicit_checksum: false,
        };
        ip.reset_header();
        ip.set_dst(destination);
        ip
    }

    // The buffer always holds exactly one minimum-size header.
    fn view(&self) -> Ipv4Packet<'_> {
        Ipv4Packet::new(&self.header).unwrap()
    }

    fn view_mut(&mut self) -> MutableIpv4Packet<'_> {
        MutableIpv4Packet::new(&mut self.header).unwrap()
    }

    /// Restore the default header, keeping the addresses.
    ///
    /// The identification is randomized and the checksum is computed again on send.
    pub fn reset_header(&mut self) {
        let source = self.get_src();
        let destination = self.get_dst();
        let protocol = self.get_proto();
        let identification = thread_rng().gen::<u16>();
        self.header = [0u8; IPV4_HEADER_SIZE];
        let mut ip = self.view_mut();
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_ttl(64);
        ip.set_identification(identification);
        ip.set_next_level_protocol(protocol);
        ip.set_source(source);
        ip.set_destination(destination);
        self.explicit_checksum = false;
    }

    /// The raw header, in network byte order.
    pub fn raw_header(&self) -> &[u8; IPV4_HEADER_SIZE] {
        &self.header
    }

    pub fn get_src(&self) -> Ipv4Addr {
        self.view().get_source()
    }

    pub fn set_src(&mut self, addr: Ipv4Addr) -> Ipv4Addr {
        self.view_mut().set_source(addr);
        addr
    }

    pub fn get_dst(&self) -> Ipv4Addr {
        self.view().get_destination()
    }

    pub fn set_dst(&mut self, addr: Ipv4Addr) -> Ipv4Addr {
        self.view_mut().set_destination(addr);
        addr
    }

    pub fn get_ttl(&self) -> u8 {
        self.view().get_ttl()
    }

    pub fn set_ttl(&mut self, ttl: u8) -> u8 {
        self.view_mut().set_ttl(ttl);
        ttl
    }

    pub fn get_id(&self) -> u16 {
        self.view().get_identification()
    }

    pub fn set_id(&mut self, id: u16) -> u16 {
        self.view_mut().set_identification(id);
        id
    }

    /// Type of service: DSCP (upper six bits) and ECN (lower two bits).
    pub fn get_tos(&self) -> u8 {
        let ip = self.view();
        (ip.get_dscp() << 2) | ip.get_ecn()
    }

    pub fn set_tos(&mut self, tos: u8) -> u8 {
        let mut ip = self.view_mut();
        ip.set_dscp(tos >> 2);
        ip.set_ecn(tos & 0b11);
        tos
    }

    /// Fragmentation flags (reserved, DF, MF).
    pub fn get_flags(&self) -> u8 {
        self.view().get_flags()
    }

    pub fn set_flags(&mut self, flags: u8) -> u8 {
        self.view_mut().set_flags(flags);
        flags
    }

    /// Fragment offset, in 8-byte units.
    pub fn get_fragoff(&self) -> u16 {
        self.view().get_fragment_offset()
    }

    pub fn set_fragoff(&mut self, offset: u16) -> u16 {
        self.view_mut().set_fragment_offset(offset);
        offset
    }

    pub fn get_proto(&self) -> IpNextHeaderProtocol {
        self.view().get_next_level_protocol()
    }

    pub fn set_proto(&mut self, protocol: IpNextHeaderProtocol) -> IpNextHeaderProtocol {
        self.view_mut().set_next_level_protocol(protocol);
        protocol
    }

    pub fn get_sum(&self) -> u16 {
        self.view().get_checksum()
    }

    /// Set the header checksum. It is no longer computed by `sendpack`
    /// until the header is reset.
    pub fn set_sum(&mut self, checksum: u16) -> u16 {
        self.view_mut().set_checksum(checksum);
        self.explicit_checksum = true;
        checksum
    }

    /// Header length, in 32-bit words.
    pub fn get_hlen(&self) -> u8 {
        self.view().get_header_length()
    }

    pub fn get_totlen(&self) -> u16 {
        self.view().get_total_length()
    }
}

impl NetworkLayer for Ip {
    const NAME: &'static str = "IP";

    type Snapshot = ([u8; IPV4_HEADER_SIZE], bool);

    fn layer2(&self) -> &Layer2 {
        &self.layer2
    }

    fn layer2_mut(&mut self) -> &mut Layer2 {
        &mut self.layer2
    }

    fn header_size(&self) -> usize {
        IPV4_HEADER_SIZE
    }

    fn write_header(&mut self, buffer: &mut [u8], upper_size: usize) -> Result<()> {
        let total_length = IPV4_HEADER_SIZE + upper_size;
        if total_length > u16::MAX as usize {
            return Err(Error::Size {
                layer: Self::NAME,
                size: total_length,
                max: u16::MAX as usize,
            });
        }
        {
            let mut ip = self.view_mut();
            ip.set_header_length(5);
            ip.set_total_length(total_length as u16);
        }
        if !self.explicit_checksum {
            self.view_mut().set_checksum(0);
            let checksum = internet_checksum(&self.header, 5);
            self.view_mut().set_checksum(checksum);
        }
        buffer.copy_from_slice(&self.header);
        Ok(())
    }

    fn pseudo_header(&self) -> PseudoHeader {
        PseudoHeader::V4 {
            source: self.get_src(),
            destination: self.get_dst(),
            protocol: self.get_proto(),
        }
    }

    fn snapshot(&self) -> Self::Snapshot {
        (self.header, self.explicit_checksum)
    }

    fn restore(&mut self, (header, explicit_checksum): Self::Snapshot) {
        self.header = header;
        self.explicit_checksum = explicit_checksum;
    }

    fn set_protocol(&mut self, protocol: IpNextHeaderProtocol) {
        self.set_proto(protocol);
    }

    fn init_device(&mut self, device: &str, promiscuous: bool, snaplen: usize) -> Result<()> {
        self.layer2.init_device(device, promiscuous, snaplen)?;
        // Keep a narrower filter installed by an upper layer.
        if self.layer2.filter().is_none() {
            self.layer2.set_filter("ip")?;
        }
        self.layer2.raw_tx_mut().set_frame_type(EtherTypes::Ipv4);
        Ok(())
    }

    fn sniffpack(&mut self, buffer: &mut [u8], offset: &mut usize) -> Result<usize> {
        let size = self.layer2.sniffpack(buffer, offset)?;
        if size == 0 && self.layer2.timed_out() {
            return Ok(0);
        }

        let start = *offset;
        let header_size = buffer
            .get(start..size)
            .filter(|data| data.len() >= IPV4_HEADER_SIZE)
            .map(|data| (data[0] & 0x0f) as usize * 4)
            .filter(|&header_size| header_size >= IPV4_HEADER_SIZE)
            .ok_or_else(|| {
                warn!("IP: short packet size={} offset={}", size, start);
                Error::Framing {
                    layer: Self::NAME,
                    available: size,
                    required: start + IPV4_HEADER_SIZE,
                }
            })?;
        if size < start + header_size {
            warn!("IP: truncated options size={} offset={}", size, start);
            return Err(Error::Framing {
                layer: Self::NAME,
                available: size,
                required: start + header_size,
            });
        }

        self.header
            .copy_from_slice(&buffer[start..start + IPV4_HEADER_SIZE]);
        self.explicit_checksum = false;
        *offset = start + header_size;

        // Drop the link-layer padding of short frames.
        let total_length = self.get_totlen() as usize;
        if total_length >= header_size && start + total_length <= size {
            Ok(start + total_length)
        } else {
            Ok(size)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use pnet::packet::ip::IpNextHeaderProtocols;
    use pnet::packet::ipv4;

    use super::*;
    use crate::capabilities::Loopback;

    fn loopback_ip(destination: Ipv4Addr) -> (Loopback, Ip) {
        let loopback = Loopback::new();
        let layer2 = Layer2::with_capabilities(
            Config::default(),
            Rc::new(RefCell::new(loopback.rx())),
            Rc::new(RefCell::new(loopback.tx())),
        );
        (loopback, Ip::with_layer2(destination, layer2))
    }

    #[test]
    fn test_default_header() {
        let (_, ip) = loopback_ip(Ipv4Addr::new(192, 0, 2, 1));
        assert_eq!(ip.get_dst(), Ipv4Addr::new(192, 0, 2, 1));
        assert_eq!(ip.get_src(), Ipv4Addr::UNSPECIFIED);
        assert_eq!(ip.get_hlen(), 5);
        assert_eq!(ip.get_ttl(), 64);
        assert_eq!(ip.raw_header()[0], 0x45);
    }

    #[test]
    fn test_setters_return_new_value() {
        let (_, mut ip) = loopback_ip(Ipv4Addr::new(192, 0, 2, 1));
        assert_eq!(ip.set_ttl(7), 7);
        assert_eq!(ip.set_tos(0xb8), 0xb8);
        assert_eq!(ip.get_tos(), 0xb8);
        assert_eq!(ip.set_id(4242), 4242);
        assert_eq!(ip.raw_header()[4..6], 4242u16.to_be_bytes());
        assert_eq!(ip.set_flags(0b010), 0b010);
        assert_eq!(ip.get_flags(), 0b010);
    }

    #[test]
    fn test_sendpack_sniffpack() {
        let (_, mut ip) = loopback_ip(Ipv4Addr::new(192, 0, 2, 1));
        ip.init_device("lo", false, 1500).unwrap();
        assert_eq!(ip.layer2().filter().as_deref(), Some("ip"));

        ip.set_src(Ipv4Addr::new(192, 0, 2, 2));
        ip.set_proto(IpNextHeaderProtocols::Udp);
        assert_eq!(ip.sendpack(&[0xaa; 8]).unwrap(), 28);

        let mut buffer = [0u8; 64];
        let mut offset = 0;
        let end = ip.sniffpack(&mut buffer, &mut offset).unwrap();
        assert_eq!(end, 28);
        assert_eq!(offset, IPV4_HEADER_SIZE);
        assert_eq!(&buffer[offset..end], &[0xaa; 8]);

        let packet = Ipv4Packet::new(&buffer[..end]).unwrap();
        assert_eq!(packet.get_checksum(), ipv4::checksum(&packet));
        assert_eq!(packet.get_total_length(), 28);
        assert_eq!(ip.get_proto(), IpNextHeaderProtocols::Udp);
    }

    #[test]
    fn test_sniffpack_drops_padding() {
        let (loopback, mut ip) = loopback_ip(Ipv4Addr::new(192, 0, 2, 1));
        ip.init_device("lo", false, 1500).unwrap();

        // Minimum Ethernet payload.
        let mut padded = [0u8; 46];
        let mut sender = ip.clone();
        let header_size = sender.header_size();
        sender
            .write_header(&mut padded[..header_size], 4)
            .unwrap();
        padded[header_size..header_size + 4].copy_from_slice(&[1, 2, 3, 4]);
        loopback.inject(&padded);

        assert_eq!(ip.sniff_payload().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_sniffpack_short_packet() {
        let (loopback, mut ip) = loopback_ip(Ipv4Addr::new(192, 0, 2, 1));
        ip.init_device("lo", false, 1500).unwrap();
        let before = *ip.raw_header();

        loopback.inject(&[0x45; 12]);
        let mut buffer = [0u8; 64];
        let mut offset = 0;
        let result = ip.sniffpack(&mut buffer, &mut offset);
        assert!(matches!(result, Err(Error::Framing { .. })));
        assert_eq!(*ip.raw_header(), before);

        // Header length pointing past the captured data.
        let mut options = [0u8; 24];
        options[0] = 0x4f;
        loopback.inject(&options);
        let result = ip.sniffpack(&mut buffer, &mut offset);
        assert!(matches!(result, Err(Error::Framing { required: 60, .. })));
        assert_eq!(offset, 0);
    }

    #[test]
    fn test_sendpack_too_large() {
        let (loopback, mut ip) = loopback_ip(Ipv4Addr::new(192, 0, 2, 1));
        ip.init_device("lo", false, 1500).unwrap();
        let result = ip.sendpack(&[0u8; 1481]);
        assert!(matches!(result, Err(Error::Size { size: 1501, .. })));
        assert_eq!(loopback.pending(), 0);
    }

    #[test]
    fn test_explicit_checksum() {
        let (_, mut ip) = loopback_ip(Ipv4Addr::new(192, 0, 2, 1));
        ip.init_device("lo", false, 1500).unwrap();
        ip.set_sum(0x1234);
        ip.sendpack(&[]).unwrap();
        assert_eq!(ip.get_sum(), 0x1234);

        ip.reset_header();
        ip.sendpack(&[]).unwrap();
        let header = Ipv4Packet::new(ip.raw_header()).unwrap();
        assert_eq!(header.get_checksum(), ipv4::checksum(&header));
        assert_eq!(ip.get_dst(), Ipv4Addr::new(192, 0, 2, 1));
    }

    #[test]
    fn test_write_header_length_overflow() {
        let (_, mut ip) = loopback_ip(Ipv4Addr::new(192, 0, 2, 1));
        let header = *ip.raw_header();
        let mut buffer = [0u8; IPV4_HEADER_SIZE];

        let result = ip.write_header(&mut buffer, 65536 - IPV4_HEADER_SIZE);
        assert!(matches!(result, Err(Error::Size { size: 65536, max: 65535, .. })));
        assert_eq!(ip.raw_header(), &header);

        ip.write_header(&mut buffer, 65535 - IPV4_HEADER_SIZE).unwrap();
        assert_eq!(ip.get_totlen(), 65535);
    }
}
