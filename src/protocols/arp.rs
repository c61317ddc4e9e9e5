use log::{debug, warn};
use pnet::packet::arp::{ArpHardwareType, ArpHardwareTypes, ArpOperation, ArpOperations};
use pnet::packet::ethernet::{EtherType, EtherTypes};
use pnet::util::MacAddr;

use crate::config::{Config, DEFAULT_SNAPLEN};
use crate::error::{Error, Result};
use crate::layer2::Layer2;

/// Size of the fixed part of the ARP header (without the addresses).
pub const ARP_HEADER_SIZE: usize = 8;

/// Fixed part of an ARP header (RFC 826).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ArpHeader {
    pub hardware_type: ArpHardwareType,
    pub protocol_type: EtherType,
    pub hw_addr_len: u8,
    pub proto_addr_len: u8,
    pub operation: ArpOperation,
}

impl Default for ArpHeader {
    fn default() -> Self {
        ArpHeader {
            hardware_type: ArpHardwareTypes::Ethernet,
            protocol_type: EtherTypes::Ipv4,
            hw_addr_len: 6,
            proto_addr_len: 4,
            operation: ArpOperations::Request,
        }
    }
}

impl ArpHeader {
    pub fn to_bytes(&self) -> [u8; ARP_HEADER_SIZE] {
        let mut bytes = [0u8; ARP_HEADER_SIZE];
        bytes[0..2].copy_from_slice(&self.hardware_type.0.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.protocol_type.0.to_be_bytes());
        bytes[4] = self.hw_addr_len;
        bytes[5] = self.proto_addr_len;
        bytes[6..8].copy_from_slice(&self.operation.0.to_be_bytes());
        bytes
    }

    /// Decode the header from the first [`ARP_HEADER_SIZE`] bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..ARP_HEADER_SIZE)?;
        Some(ArpHeader {
            hardware_type: ArpHardwareType(u16::from_be_bytes([bytes[0], bytes[1]])),
            protocol_type: EtherType(u16::from_be_bytes([bytes[2], bytes[3]])),
            hw_addr_len: bytes[4],
            proto_addr_len: bytes[5],
            operation: ArpOperation(u16::from_be_bytes([bytes[6], bytes[7]])),
        })
    }
}

/// ARP over Ethernet.
///
/// Unlike the layered protocols, [`Arp::sniffpack`] does not advance the
/// offset past its header: ARP has no upper layer, so the captured "payload"
/// is the whole ARP message, header included.
#[derive(Clone)]
pub struct Arp {
    layer2: Layer2,
    header: ArpHeader,
}

impl Arp {
    /// ARP over a libpcap device, with an Ethernet transmitter bound to it.
    pub fn new(config: Config) -> Self {
        Self::with_layer2(Layer2::ethernet(config))
    }

    pub fn with_layer2(layer2: Layer2) -> Self {
        Arp {
            layer2,
            header: ArpHeader::default(),
        }
    }

    pub fn layer2(&self) -> &Layer2 {
        &self.layer2
    }

    pub fn layer2_mut(&mut self) -> &mut Layer2 {
        &mut self.layer2
    }

    pub fn header(&self) -> &ArpHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut ArpHeader {
        &mut self.header
    }

    /// The ARP operation (request, reply, ...).
    pub fn get_op(&self) -> ArpOperation {
        self.header.operation
    }

    pub fn set_op(&mut self, operation: ArpOperation) -> ArpOperation {
        self.header.operation = operation;
        operation
    }

    pub fn set_l2_source(&mut self, addr: MacAddr) {
        self.layer2.raw_tx_mut().set_l2_source(addr)
    }

    pub fn set_l2_destination(&mut self, addr: MacAddr) {
        self.layer2.raw_tx_mut().set_l2_destination(addr)
    }

    /// Open `device`, capture ARP only, and broadcast ARP frames.
    pub fn init_device(&mut self, device: &str, promiscuous: bool, snaplen: usize) -> Result<()> {
        self.layer2.init_device(device, promiscuous, snaplen)?;
        self.layer2.set_filter("arp")?;

        let mut tx = self.layer2.raw_tx_mut();
        tx.set_frame_type(EtherTypes::Arp);
        tx.set_broadcast();
        Ok(())
    }

    pub fn set_filter(&mut self, filter: &str) -> Result<()> {
        self.layer2.set_filter(filter)
    }

    /// Send the ARP header followed by `payload` (the addresses).
    pub fn sendpack(&mut self, payload: &[u8]) -> Result<usize> {
        let size = ARP_HEADER_SIZE + payload.len();
        let max = self.layer2.max_packet_size();
        if size > max {
            return Err(Error::Size {
                layer: "ARP",
                size,
                max,
            });
        }

        let mut buffer = vec![0u8; size];
        buffer[..ARP_HEADER_SIZE].copy_from_slice(&self.header.to_bytes());
        buffer[ARP_HEADER_SIZE..].copy_from_slice(payload);
        self.layer2.sendpack(&buffer)
    }

    /// Capture an ARP message into `buffer`.
    ///
    /// Returns the number of bytes read, or `Ok(0)` on timeout. The header
    /// found at `offset` is copied, but `offset` is left unchanged.
    pub fn sniffpack(&mut self, buffer: &mut [u8], offset: &mut usize) -> Result<usize> {
        let size = self.layer2.sniffpack(buffer, offset)?;
        if size == 0 && self.layer2.timed_out() {
            return Ok(0);
        }

        let header = buffer
            .get(*offset..size)
            .and_then(ArpHeader::from_bytes)
            .ok_or_else(|| {
                warn!("ARP: short packet size={} offset={}", size, offset);
                Error::Framing {
                    layer: "ARP",
                    available: size,
                    required: *offset + ARP_HEADER_SIZE,
                }
            })?;
        debug!("ARP: op={:?} size={}", header.operation, size);
        self.header = header;
        Ok(size)
    }

    /// Capture an ARP message, returning it (header included).
    ///
    /// Returns an empty message on timeout.
    pub fn sniff_payload(&mut self) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; DEFAULT_SNAPLEN];
        let mut offset = 0;
        let size = self.sniffpack(&mut buffer, &mut offset)?;
        Ok(buffer.get(offset..size).unwrap_or(&[]).to_vec())
    }
}
