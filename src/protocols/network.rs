use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::util::MacAddr;

use crate::checksum::PseudoHeader;
use crate::config::DEFAULT_SNAPLEN;
use crate::error::{Error, Result};
use crate::layer2::Layer2;

/// A network layer that a transport protocol can be stacked on.
///
/// Implemented by [`Ip`](super::Ip) and [`Ip6`](super::Ip6).
pub trait NetworkLayer {
    /// Name used in error messages.
    const NAME: &'static str;

    /// Header state saved by [`NetworkLayer::snapshot`].
    type Snapshot;

    fn layer2(&self) -> &Layer2;

    fn layer2_mut(&mut self) -> &mut Layer2;

    /// Number of bytes [`NetworkLayer::write_header`] writes.
    fn header_size(&self) -> usize;

    /// Write the header for an upper-layer message of `upper_size` bytes into
    /// `buffer`, which is exactly [`NetworkLayer::header_size`] bytes long.
    ///
    /// Fails with [`Error::Size`], leaving the header untouched, if the length
    /// does not fit the header's length field.
    fn write_header(&mut self, buffer: &mut [u8], upper_size: usize) -> Result<()>;

    /// Addresses and protocol number covered by the transport checksum.
    fn pseudo_header(&self) -> PseudoHeader;

    /// Save the header state, so that a capture rejected by an upper layer can be rolled back.
    fn snapshot(&self) -> Self::Snapshot;

    fn restore(&mut self, snapshot: Self::Snapshot);

    /// Set the protocol number of the upper layer.
    fn set_protocol(&mut self, protocol: IpNextHeaderProtocol);

    /// Open `device`, install the layer's filter and frame type.
    fn init_device(&mut self, device: &str, promiscuous: bool, snaplen: usize) -> Result<()>;

    /// Capture a packet into `buffer` and advance `offset` past the network header.
    ///
    /// Returns the index of the end of the packet in `buffer` (0 on timeout).
    fn sniffpack(&mut self, buffer: &mut [u8], offset: &mut usize) -> Result<usize>;

    /// Send the network header followed by `payload`.
    fn sendpack(&mut self, payload: &[u8]) -> Result<usize> {
        let header_size = self.header_size();
        let size = header_size + payload.len();
        let max = self.layer2().max_packet_size();
        if size > max {
            return Err(Error::Size {
                layer: Self::NAME,
                size,
                max,
            });
        }

        let mut buffer = vec![0u8; size];
        self.write_header(&mut buffer[..header_size], payload.len())?;
        buffer[header_size..].copy_from_slice(payload);
        self.layer2_mut().sendpack(&buffer)
    }

    /// Capture a packet and return what follows the network header.
    ///
    /// Returns an empty payload on timeout.
    fn sniff_payload(&mut self) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; DEFAULT_SNAPLEN];
        let mut offset = 0;
        let end = self.sniffpack(&mut buffer, &mut offset)?;
        Ok(buffer.get(offset..end).unwrap_or(&[]).to_vec())
    }

    fn set_filter(&mut self, filter: &str) -> Result<()> {
        self.layer2_mut().set_filter(filter)
    }

    fn set_l2_source(&mut self, addr: MacAddr) {
        self.layer2().raw_tx_mut().set_l2_source(addr)
    }

    fn set_l2_destination(&mut self, addr: MacAddr) {
        self.layer2().raw_tx_mut().set_l2_destination(addr)
    }
}
