use std::net::{Ipv4Addr, Ipv6Addr};

use log::{trace, warn};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::tcp::{MutableTcpPacket, TcpPacket};
use rand::{thread_rng, Rng};

use crate::config::{Config, DEFAULT_SNAPLEN};
use crate::error::{Error, Result};
use crate::layer2::Layer2;
use crate::protocols::{Ip, Ip6, NetworkLayer};

/// Size of a TCP header without options.
pub const TCP_HEADER_SIZE: usize = 20;

/// Maximum size of the TCP options.
pub const TCP_MAX_OPTIONS_SIZE: usize = 40;

/// Index of the 16-bit word holding the TCP checksum.
const CHECKSUM_WORD: usize = 8;

/// TCP over a [`NetworkLayer`].
///
/// The header state (fixed header and options) belongs to this object and
/// is not shared with its clones; the capture/transmit capabilities are.
#[derive(Clone)]
pub struct Tcp<T> {
    network: T,
    header: [u8; TCP_HEADER_SIZE],
    options: [u8; TCP_MAX_OPTIONS_SIZE],
    options_size: usize,
    compute_checksum: bool,
    explicit_checksum: bool,
}

/// TCP over IPv4.
pub type Tcp4 = Tcp<Ip>;

/// TCP over IPv6.
pub type Tcp6 = Tcp<Ip6>;

impl Tcp<Ip> {
    /// TCP over IPv4 over a libpcap device.
    pub fn new(destination: Ipv4Addr, config: Config) -> Self {
        Tcp::over(Ip::new(destination, config))
    }
}

impl Tcp<Ip6> {
    /// TCP over IPv6 over a libpcap device.
    pub fn new(destination: Ipv6Addr, config: Config) -> Self {
        Tcp::over(Ip6::new(destination, config))
    }
}

impl<T: NetworkLayer> Tcp<T> {
    /// Stack TCP on `network`, setting its protocol number to TCP.
    pub fn over(mut network: T) -> Self {
        network.set_protocol(IpNextHeaderProtocols::Tcp);
        let mut tcp = Tcp {
            network,
            header: [0u8; TCP_HEADER_SIZE],
            options: [0u8; TCP_MAX_OPTIONS_SIZE],
            options_size: 0,
            compute_checksum: true,
            explicit_checksum: false,
        };
        tcp.reset_header();
        tcp
    }

    pub fn network(&self) -> &T {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut T {
        &mut self.network
    }

    pub fn layer2(&self) -> &Layer2 {
        self.network.layer2()
    }

    pub fn layer2_mut(&mut self) -> &mut Layer2 {
        self.network.layer2_mut()
    }

    // The buffer always holds exactly one header without options.
    fn view(&self) -> TcpPacket<'_> {
        TcpPacket::new(&self.header).unwrap()
    }

    fn view_mut(&mut self) -> MutableTcpPacket<'_> {
        MutableTcpPacket::new(&mut self.header).unwrap()
    }

    /// Restore the default header, keeping the ports and the options.
    ///
    /// The sequence number is randomized and the checksum is computed again on send.
    pub fn reset_header(&mut self) {
        let source = self.get_srcport();
        let destination = self.get_dstport();
        let sequence = thread_rng().gen::<u32>();
        let data_offset = ((TCP_HEADER_SIZE + self.options_size) / 4) as u8;
        self.header = [0u8; TCP_HEADER_SIZE];
        let mut tcp = self.view_mut();
        tcp.set_source(source);
        tcp.set_destination(destination);
        tcp.set_sequence(sequence);
        tcp.set_data_offset(data_offset);
        tcp.set_window(u16::MAX);
        self.explicit_checksum = false;
    }

    /// The raw header (without options), in network byte order.
    pub fn raw_header(&self) -> &[u8; TCP_HEADER_SIZE] {
        &self.header
    }

    pub fn get_srcport(&self) -> u16 {
        self.view().get_source()
    }

    pub fn set_srcport(&mut self, port: u16) -> u16 {
        self.view_mut().set_source(port);
        port
    }

    pub fn get_dstport(&self) -> u16 {
        self.view().get_destination()
    }

    pub fn set_dstport(&mut self, port: u16) -> u16 {
        self.view_mut().set_destination(port);
        port
    }

    pub fn get_seq(&self) -> u32 {
        self.view().get_sequence()
    }

    pub fn set_seq(&mut self, sequence: u32) -> u32 {
        self.view_mut().set_sequence(sequence);
        sequence
    }

    pub fn get_ack(&self) -> u32 {
        self.view().get_acknowledgement()
    }

    pub fn set_ack(&mut self, acknowledgement: u32) -> u32 {
        self.view_mut().set_acknowledgement(acknowledgement);
        acknowledgement
    }

    /// Data offset (header length including options), in 32-bit words.
    pub fn get_off(&self) -> u8 {
        self.view().get_data_offset()
    }

    pub fn set_off(&mut self, data_offset: u8) -> u8 {
        let data_offset = data_offset & 0x0f;
        self.view_mut().set_data_offset(data_offset);
        data_offset
    }

    /// Control flags, see [`pnet::packet::tcp::TcpFlags`].
    pub fn get_flags(&self) -> u16 {
        u16::from(self.view().get_flags())
    }

    pub fn set_flags(&mut self, flags: u16) -> u16 {
        self.view_mut().set_flags(flags as _);
        flags
    }

    pub fn get_win(&self) -> u16 {
        self.view().get_window()
    }

    pub fn set_win(&mut self, window: u16) -> u16 {
        self.view_mut().set_window(window);
        window
    }

    pub fn get_urg(&self) -> u16 {
        self.view().get_urgent_ptr()
    }

    pub fn set_urg(&mut self, urgent: u16) -> u16 {
        self.view_mut().set_urgent_ptr(urgent);
        urgent
    }

    pub fn get_tcpsum(&self) -> u16 {
        self.view().get_checksum()
    }

    /// Set the checksum. `sendpack` keeps it until the header is reset or
    /// replaced by a captured one.
    pub fn set_tcpsum(&mut self, checksum: u16) -> u16 {
        self.view_mut().set_checksum(checksum);
        self.explicit_checksum = true;
        checksum
    }

    /// Whether `sendpack` computes the checksum.
    pub fn set_checksum_enabled(&mut self, enabled: bool) {
        self.compute_checksum = enabled;
    }

    pub fn checksum_enabled(&self) -> bool {
        self.compute_checksum
    }

    /// Replace the options. An empty slice clears them.
    ///
    /// The options must be word-aligned and at most 40 bytes long, otherwise
    /// nothing changes. The data offset is updated to cover them.
    pub fn set_options(&mut self, options: &[u8]) -> Result<()> {
        if options.len() % 4 != 0 || options.len() > TCP_MAX_OPTIONS_SIZE {
            return Err(Error::Options(options.len()));
        }
        self.options = [0u8; TCP_MAX_OPTIONS_SIZE];
        self.options[..options.len()].copy_from_slice(options);
        self.options_size = options.len();
        self.set_off(((TCP_HEADER_SIZE + self.options_size) / 4) as u8);
        Ok(())
    }

    pub fn get_options(&self) -> &[u8] {
        &self.options[..self.options_size]
    }

    /// Capture TCP only, then initialize the network layer.
    pub fn init_device(&mut self, device: &str, promiscuous: bool, snaplen: usize) -> Result<()> {
        self.network.set_filter("tcp")?;
        self.network.init_device(device, promiscuous, snaplen)
    }

    pub fn set_filter(&mut self, filter: &str) -> Result<()> {
        self.network.set_filter(filter)
    }

    /// Send a segment carrying `payload`.
    ///
    /// The network header, TCP header, options and payload are written into
    /// one buffer, after checking that they fit the size budget.
    pub fn sendpack(&mut self, payload: &[u8]) -> Result<usize> {
        let network_size = self.network.header_size();
        let header_size = TCP_HEADER_SIZE + self.options_size;
        let segment_size = header_size + payload.len();
        let size = network_size + segment_size;
        let max = self.layer2().max_packet_size();
        if size > max {
            return Err(Error::Size {
                layer: "TCP",
                size,
                max,
            });
        }

        let mut buffer = vec![0u8; size];
        {
            let segment = &mut buffer[network_size..];
            segment[..TCP_HEADER_SIZE].copy_from_slice(&self.header);
            segment[TCP_HEADER_SIZE..header_size].copy_from_slice(self.get_options());
            segment[header_size..].copy_from_slice(payload);
        }

        // Fails before the TCP header is touched if the length field overflows.
        self.network
            .write_header(&mut buffer[..network_size], segment_size)?;

        if self.compute_checksum && !self.explicit_checksum {
            let checksum = self
                .network
                .pseudo_header()
                .checksum(&buffer[network_size..], CHECKSUM_WORD);
            self.view_mut().set_checksum(checksum);
            buffer[network_size + 16..network_size + 18].copy_from_slice(&checksum.to_be_bytes());
            trace!("TCP: checksum={:#06x}", checksum);
        }

        self.network.layer2_mut().sendpack(&buffer)
    }

    /// Capture a segment into `buffer`.
    ///
    /// The network layer advances `offset` past its header, then this layer
    /// past the TCP header and options. Returns the payload length, which
    /// starts at `offset`, or `Ok(0)` on timeout.
    ///
    /// If the segment is rejected, the network header and `offset` are
    /// restored to what they were before the capture.
    pub fn sniffpack(&mut self, buffer: &mut [u8], offset: &mut usize) -> Result<usize> {
        let initial_offset = *offset;
        let snapshot = self.network.snapshot();
        let end = self.network.sniffpack(buffer, offset)?;
        if end == 0 && self.layer2().timed_out() {
            return Ok(0);
        }

        match self.parse_segment(buffer, *offset, end) {
            Ok(options_end) => {
                *offset = options_end;
                Ok(end - options_end)
            }
            Err(error) => {
                self.network.restore(snapshot);
                *offset = initial_offset;
                Err(error)
            }
        }
    }

    /// Copy the header and options found at `start`, returning the index past the options.
    fn parse_segment(&mut self, buffer: &[u8], start: usize, end: usize) -> Result<usize> {
        let header = buffer
            .get(start..end)
            .and_then(|data| data.get(..TCP_HEADER_SIZE))
            .ok_or_else(|| {
                warn!("TCP: short packet end={} offset={}", end, start);
                Error::Framing {
                    layer: "TCP",
                    available: end,
                    required: start + TCP_HEADER_SIZE,
                }
            })?;

        let data_offset = (header[12] >> 4) as usize * 4;
        let options_size = data_offset.saturating_sub(TCP_HEADER_SIZE);
        let options_end = start + TCP_HEADER_SIZE + options_size;
        if end < options_end {
            warn!("TCP: truncated options end={} offset={}", end, start);
            return Err(Error::Framing {
                layer: "TCP",
                available: end,
                required: options_end,
            });
        }

        self.header.copy_from_slice(header);
        self.options = [0u8; TCP_MAX_OPTIONS_SIZE];
        self.options[..options_size].copy_from_slice(&buffer[start + TCP_HEADER_SIZE..options_end]);
        self.options_size = options_size;
        self.explicit_checksum = false;
        Ok(options_end)
    }

    /// Capture a segment and return its payload.
    ///
    /// Returns an empty payload on timeout.
    pub fn sniff_payload(&mut self) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; DEFAULT_SNAPLEN];
        let mut offset = 0;
        let size = self.sniffpack(&mut buffer, &mut offset)?;
        Ok(buffer[offset..offset + size].to_vec())
    }
}
