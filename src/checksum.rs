//! Functions for computing Internet checksums.
use std::net::{Ipv4Addr, Ipv6Addr};

use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::util;

/// Network-layer fields folded into a transport checksum.
///
/// The segment length is taken from the data being summed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PseudoHeader {
    V4 {
        source: Ipv4Addr,
        destination: Ipv4Addr,
        protocol: IpNextHeaderProtocol,
    },
    V6 {
        source: Ipv6Addr,
        destination: Ipv6Addr,
        next_header: IpNextHeaderProtocol,
    },
}

impl PseudoHeader {
    /// One's-complement checksum of the pseudo header and `segment`,
    /// skipping the 16-bit word at index `skipword` (the checksum field).
    pub fn checksum(&self, segment: &[u8], skipword: usize) -> u16 {
        match self {
            PseudoHeader::V4 {
                source,
                destination,
                protocol,
            } => util::ipv4_checksum(segment, skipword, &[], source, destination, *protocol),
            PseudoHeader::V6 {
                source,
                destination,
                next_header,
            } => util::ipv6_checksum(segment, skipword, &[], source, destination, *next_header),
        }
    }
}

/// One's-complement checksum of `data`, skipping the word at index `skipword`.
pub fn internet_checksum(data: &[u8], skipword: usize) -> u16 {
    util::checksum(data, skipword)
}
