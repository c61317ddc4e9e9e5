use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use log::{debug, trace};
use pcap::{Active, Capture, Linktype};

use crate::error::{Error, Result};

/// The capture device, owned by a [`PcapRx`].
///
/// The slot exists before the device is opened so that transmitters can be
/// bound to it at construction time.
pub type DeviceSlot = Rc<RefCell<Option<Capture<Active>>>>;

/// A non-owning reference to a [`DeviceSlot`].
pub type WeakDevice = Weak<RefCell<Option<Capture<Active>>>>;

/// Source of raw frames.
pub trait Rx {
    /// Open `device` for capture.
    fn init(&mut self, device: &str, promiscuous: bool, snaplen: usize) -> Result<()>;

    /// Install a filter expression (e.g. `"arp"`, `"tcp"`).
    ///
    /// A filter set before [`Rx::init`] is applied when the device is opened.
    fn set_filter(&mut self, filter: &str) -> Result<()>;

    /// The currently configured filter expression.
    fn filter(&self) -> Option<String>;

    /// Bound the time a [`Rx::receive`] call blocks. `None` blocks until a frame arrives.
    fn set_timeout(&mut self, timeout: Option<Duration>);

    /// Copy the next frame, without its link-layer framing, into `buffer`.
    ///
    /// Frames longer than `buffer` are truncated. Returns `Ok(0)` and sets
    /// [`Rx::timed_out`] if the timeout elapsed first.
    fn receive(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Whether the most recent [`Rx::receive`] timed out.
    fn timed_out(&self) -> bool;

    /// Total number of bytes delivered by [`Rx::receive`].
    fn bytes_received(&self) -> u64;

    /// The device slot a transmitter can borrow, if this capability has one.
    fn device(&self) -> Option<WeakDevice> {
        None
    }
}

/// libpcap capture capability.
pub struct PcapRx {
    device: DeviceSlot,
    name: Option<String>,
    promiscuous: bool,
    snaplen: usize,
    filter: Option<String>,
    timeout: Option<Duration>,
    timed_out: bool,
    link_header_size: usize,
    bytes_received: u64,
}

impl PcapRx {
    /// pcap read timeout. Longer user timeouts are implemented by polling.
    const POLL_INTERVAL_MS: i32 = 50;

    pub fn new(timeout: Option<Duration>) -> Self {
        PcapRx {
            device: Rc::new(RefCell::new(None)),
            name: None,
            promiscuous: false,
            snaplen: 0,
            filter: None,
            timeout,
            timed_out: false,
            link_header_size: 0,
            bytes_received: 0,
        }
    }

    /// Name of the opened device.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn promiscuous(&self) -> bool {
        self.promiscuous
    }

    pub fn snaplen(&self) -> usize {
        self.snaplen
    }
}

impl Default for PcapRx {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Size of the link-layer framing that precedes the ARP or IP header.
pub fn link_header_size(linktype: Linktype) -> Result<usize> {
    match linktype {
        Linktype::ETHERNET => Ok(14),
        // BSD loopback, OpenBSD loopback
        Linktype::NULL | Linktype(108) => Ok(4),
        // Linux cooked capture
        Linktype(113) => Ok(16),
        // Raw IP
        Linktype(12) | Linktype(101) => Ok(0),
        other => Err(Error::Linktype(format!(
            "{} ({})",
            other.get_name().unwrap_or_else(|_| "unknown".to_string()),
            other.0
        ))),
    }
}

impl Rx for PcapRx {
    fn init(&mut self, device: &str, promiscuous: bool, snaplen: usize) -> Result<()> {
        let mut cap = pcap::Capture::from_device(device)?
            .promisc(promiscuous)
            .snaplen(snaplen as i32)
            // The pcap timeout only bounds a single read, see `receive`.
            .timeout(Self::POLL_INTERVAL_MS)
            .immediate_mode(true)
            .open()?;

        if let Some(filter) = &self.filter {
            cap.filter(filter, true)?;
        }

        self.link_header_size = link_header_size(cap.get_datalink())?;
        debug!(
            "device={} promiscuous={} snaplen={} filter={:?} link_header_size={}",
            device, promiscuous, snaplen, self.filter, self.link_header_size
        );

        self.name = Some(device.to_string());
        self.promiscuous = promiscuous;
        self.snaplen = snaplen;
        *self.device.borrow_mut() = Some(cap);
        Ok(())
    }

    fn set_filter(&mut self, filter: &str) -> Result<()> {
        if let Some(cap) = self.device.borrow_mut().as_mut() {
            cap.filter(filter, true)?;
            debug!("filter={:?}", filter);
        }
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
        self.timed_out = false;
        let mut slot = self.device.borrow_mut();
        let cap = slot.as_mut().ok_or(Error::NoDevice)?;
        let start = Instant::now();

        loop {
            match cap.next_packet() {
                Ok(packet) => {
                    let frame = packet.data.get(self.link_header_size..).unwrap_or(&[]);
                    let size = frame.len().min(buffer.len());
                    buffer[..size].copy_from_slice(&frame[..size]);
                    self.bytes_received += size as u64;
                    trace!("rx size={} data={}", size, hex::encode(&buffer[..size]));
                    return Ok(size);
                }
                Err(pcap::Error::TimeoutExpired) | Err(pcap::Error::NoMorePackets) => {
                    if let Some(timeout) = self.timeout {
                        if start.elapsed() >= timeout {
                            self.timed_out = true;
                            return Ok(0);
                        }
                    }
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    fn timed_out(&self) -> bool {
        self.timed_out
    }

    fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    fn device(&self) -> Option<WeakDevice> {
        Some(Rc::downgrade(&self.device))
    }
}
