//! In-memory capture/transmit pair.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use log::trace;
use pnet::packet::ethernet::{EtherType, EtherTypes};
use pnet::util::MacAddr;

use crate::capabilities::{Rx, Tx};
use crate::error::{Error, Result};

type Queue = Rc<RefCell<VecDeque<Vec<u8>>>>;

/// A software loop-back channel.
///
/// Every frame transmitted by one of its [`LoopbackTx`] is delivered, in
/// order, to its [`LoopbackRx`]. Frames carry no link-layer framing. An empty
/// queue behaves like an elapsed capture timeout.
#[derive(Clone, Default)]
pub struct Loopback {
    queue: Queue,
}

impl Loopback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rx(&self) -> LoopbackRx {
        LoopbackRx {
            queue: self.queue.clone(),
            device: None,
            filter: None,
            timeout: None,
            timed_out: false,
            bytes_received: 0,
        }
    }

    pub fn tx(&self) -> LoopbackTx {
        LoopbackTx {
            queue: self.queue.clone(),
            source: MacAddr::zero(),
            destination: MacAddr::zero(),
            ethertype: EtherTypes::Ipv4,
            broadcast: false,
            sent: 0,
        }
    }

    /// Inject a frame as if it had been captured.
    pub fn inject(&self, frame: &[u8]) {
        self.queue.borrow_mut().push_back(frame.to_vec());
    }

    /// Number of frames waiting to be received.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}

pub struct LoopbackRx {
    queue: Queue,
    device: Option<String>,
    filter: Option<String>,
    timeout: Option<Duration>,
    timed_out: bool,
    bytes_received: u64,
}

impl LoopbackRx {
    pub fn device_name(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl Rx for LoopbackRx {
    fn init(&mut self, device: &str, _promiscuous: bool, _snaplen: usize) -> Result<()> {
        self.device = Some(device.to_string());
        Ok(())
    }

    fn set_filter(&mut self, filter: &str) -> Result<()> {
        self.filter = Some(filter.to_string());
        Ok(())
    }

    fn filter(&self) -> Option<String> {
        self.filter.clone()
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if self.device.is_none() {
            return Err(Error::NoDevice);
        }
        match self.queue.borrow_mut().pop_front() {
            Some(frame) => {
                self.timed_out = false;
                let size = frame.len().min(buffer.len());
                buffer[..size].copy_from_slice(&frame[..size]);
                self.bytes_received += size as u64;
                trace!("rx size={} data={}", size, hex::encode(&buffer[..size]));
                Ok(size)
            }
            None => {
                self.timed_out = true;
                Ok(0)
            }
        }
    }

    fn timed_out(&self) -> bool {
        self.timed_out
    }

    fn bytes_received(&self) -> u64 {
        self.bytes_received
    }
}

pub struct LoopbackTx {
    queue: Queue,
    source: MacAddr,
    destination: MacAddr,
    ethertype: EtherType,
    broadcast: bool,
    sent: usize,
}

impl LoopbackTx {
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

    /// Number of frames transmitted.
    pub fn sent(&self) -> usize {
        self.sent
    }
}

impl Tx for LoopbackTx {
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
        trace!("tx ethertype={} data={}", self.ethertype, hex::encode(buffer));
        self.queue.borrow_mut().push_back(buffer.to_vec());
        self.sent += 1;
        Ok(buffer.len())
    }
}
