use log::trace;
use pnet::packet::ethernet::{EtherType, EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::util::MacAddr;

use crate::capabilities::WeakDevice;
use crate::error::{Error, Result};

/// Sink for raw frames.
pub trait Tx {
    /// Set the link-layer source address.
    fn set_l2_source(&mut self, addr: MacAddr);

    /// Set the link-layer destination address. Disables broadcast mode.
    fn set_l2_destination(&mut self, addr: MacAddr);

    /// Set the ethertype of the frames.
    fn set_frame_type(&mut self, ethertype: EtherType);

    /// Send every following frame to the link-layer broadcast address.
    fn set_broadcast(&mut self);

    /// Frame and send `buffer`. Returns the number of payload bytes sent.
    fn transmit(&mut self, buffer: &[u8]) -> Result<usize>;

    /// Like [`Tx::transmit`], to an explicit link-layer destination.
    fn transmit_to(&mut self, buffer: &[u8], destination: MacAddr) -> Result<usize> {
        self.set_l2_destination(destination);
        self.transmit(buffer)
    }
}

/// Transmitter that drops every frame.
///
/// Installed until a protocol object binds a real transmitter to its device.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullTx;

impl Tx for NullTx {
    fn set_l2_source(&mut self, _addr: MacAddr) {}

    fn set_l2_destination(&mut self, _addr: MacAddr) {}

    fn set_frame_type(&mut self, _ethertype: EtherType) {}

    fn set_broadcast(&mut self) {}

    fn transmit(&mut self, buffer: &[u8]) -> Result<usize> {
        Ok(buffer.len())
    }
}

/// Ethernet transmitter writing through the capture device of a [`PcapRx`](super::PcapRx).
///
/// It never keeps the device alive: once the capture capability is dropped,
/// [`Tx::transmit`] fails with [`Error::NoDevice`].
pub struct EthernetTx {
    device: WeakDevice,
    source: MacAddr,
    destination: MacAddr,
    ethertype: EtherType,
    broadcast: bool,
}

impl EthernetTx {
    pub fn new(device: WeakDevice) -> Self {
        EthernetTx {
            device,
            source: MacAddr::zero(),
            destination: MacAddr::zero(),
            ethertype: EtherTypes::Ipv4,
            broadcast: false,
        }
    }

    pub fn source(&self) -> MacAddr {
        self.source
    }

    pub fn destination(&self) -> MacAddr {
        self.destination
    }

    pub fn frame_type(&self) -> EtherType {
        self.ethertype
    }

    pub fn is_broadcast(&self) -> bool {
        self.broadcast
    }
}

/// Write the Ethernet header followed by `payload` into `frame`.
pub fn build_ethernet(
    frame: &mut [u8],
    src_addr: MacAddr,
    dst_addr: MacAddr,
    ethertype: EtherType,
    payload: &[u8],
) -> Result<usize> {
    let header_size = EthernetPacket::minimum_packet_size();
    let size = header_size + payload.len();
    if frame.len() < size {
        return Err(Error::Framing {
            layer: "Ethernet",
            available: frame.len(),
            required: size,
        });
    }
    {
        let mut ethernet = MutableEthernetPacket::new(&mut frame[..header_size]).ok_or(
            Error::Framing {
                layer: "Ethernet",
                available: header_size,
                required: header_size,
            },
        )?;
        ethernet.set_source(src_addr);
        ethernet.set_destination(dst_addr);
        ethernet.set_ethertype(ethertype);
    }
    frame[header_size..size].copy_from_slice(payload);
    Ok(size)
}

impl Tx for EthernetTx {
    fn set_l2_source(&mut self, addr: MacAddr) {
        self.source = addr;
    }

    fn set_l2_destination(&mut self, addr: MacAddr) {
        self.destination = addr;
        self.broadcast = false;
    }

    fn set_frame_type(&mut self, ethertype: EtherType) {
        self.ethertype = ethertype;
    }

    fn set_broadcast(&mut self) {
        self.destination = MacAddr::broadcast();
        self.broadcast = true;
    }

    fn transmit(&mut self, buffer: &[u8]) -> Result<usize> {
        let device = self.device.upgrade().ok_or(Error::NoDevice)?;
        let mut slot = device.borrow_mut();
        let cap = slot.as_mut().ok_or(Error::NoDevice)?;

        let mut frame = vec![0u8; EthernetPacket::minimum_packet_size() + buffer.len()];
        build_ethernet(
            &mut frame,
            self.source,
            self.destination,
            self.ethertype,
            buffer,
        )?;
        trace!(
            "tx src={} dst={} ethertype={} data={}",
            self.source,
            self.destination,
            self.ethertype,
            hex::encode(&frame)
        );
        cap.sendpacket(frame)?;
        Ok(buffer.len())
    }
}
