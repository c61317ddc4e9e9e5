//! The layer 2 engine: one shared capture and one shared transmit capability.
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use std::time::Duration;

use log::debug;
use pnet::util::MacAddr;

use crate::capabilities::{EthernetTx, NullTx, PcapRx, Rx, SharedRx, SharedTx, Tx};
use crate::config::Config;
use crate::error::Result;

/// Generic send/receive primitives over an [`Rx`] and a [`Tx`].
///
/// Cloning a `Layer2` shares the capabilities: both copies capture from and
/// transmit to the same device, which is closed when the last copy is dropped.
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use rawlayer::capabilities::Loopback;
/// use rawlayer::config::Config;
/// use rawlayer::layer2::Layer2;
///
/// let loopback = Loopback::new();
/// let mut layer2 = Layer2::with_capabilities(
///     Config::default(),
///     Rc::new(RefCell::new(loopback.rx())),
///     Rc::new(RefCell::new(loopback.tx())),
/// );
/// layer2.init_device("lo", false, 1500).unwrap();
///
/// let copy = layer2.clone();
/// assert!(Rc::ptr_eq(&copy.rx(), &layer2.rx()));
/// ```
#[derive(Clone)]
pub struct Layer2 {
    rx: SharedRx,
    tx: SharedTx,
    config: Config,
}

impl Layer2 {
    /// A libpcap capture capability and a transmitter that drops every frame.
    pub fn new(config: Config) -> Self {
        Self::with_capabilities(
            config,
            Rc::new(RefCell::new(PcapRx::new(config.timeout))),
            Rc::new(RefCell::new(NullTx)),
        )
    }

    /// A libpcap capture capability and an Ethernet transmitter bound to its device.
    ///
    /// The device does not need to be opened yet: the transmitter only keeps a
    /// weak reference to the device slot and resolves it on each transmission.
    pub fn ethernet(config: Config) -> Self {
        let mut layer2 = Self::new(config);
        let device = layer2.raw_rx().device();
        if let Some(device) = device {
            // Replaces (and releases) the default transmitter.
            layer2.register_tx(Rc::new(RefCell::new(EthernetTx::new(device))));
        }
        layer2
    }

    pub fn with_capabilities(config: Config, rx: SharedRx, tx: SharedTx) -> Self {
        Layer2 { rx, tx, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ceiling on the total size of the headers of all layers plus the payload.
    pub fn max_packet_size(&self) -> usize {
        self.config.max_packet_size
    }

    /// Open `device` for capture.
    pub fn init_device(&mut self, device: &str, promiscuous: bool, snaplen: usize) -> Result<()> {
        debug!(
            "init_device device={} promiscuous={} snaplen={} {}",
            device, promiscuous, snaplen, self.config
        );
        self.rx.borrow_mut().init(device, promiscuous, snaplen)
    }

    pub fn set_filter(&mut self, filter: &str) -> Result<()> {
        debug!("set_filter filter={:?}", filter);
        self.rx.borrow_mut().set_filter(filter)
    }

    pub fn filter(&self) -> Option<String> {
        self.rx.borrow().filter()
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.rx.borrow_mut().set_timeout(timeout)
    }

    /// Whether the last capture timed out.
    pub fn timed_out(&self) -> bool {
        self.rx.borrow().timed_out()
    }

    /// Bytes received by the capture capability, across all copies of this engine.
    pub fn bytes_received(&self) -> u64 {
        self.rx.borrow().bytes_received()
    }

    /// Transmit `buffer`. Size limits are enforced by the protocol layers.
    pub fn sendpack(&mut self, buffer: &[u8]) -> Result<usize> {
        self.tx.borrow_mut().transmit(buffer)
    }

    /// Transmit `buffer` to an explicit link-layer destination.
    pub fn sendpack_to(&mut self, buffer: &[u8], destination: MacAddr) -> Result<usize> {
        self.tx.borrow_mut().transmit_to(buffer, destination)
    }

    /// Capture a frame into `buffer`, returning the number of bytes read.
    ///
    /// Link framing is stripped by the capture capability, so `offset` is
    /// left where the caller put it. Returns `Ok(0)` if the capture timed out.
    pub fn sniffpack(&mut self, buffer: &mut [u8], offset: &mut usize) -> Result<usize> {
        let size = self.rx.borrow_mut().receive(buffer)?;
        if size == 0 && self.timed_out() {
            debug!("sniffpack timed out offset={}", offset);
        }
        Ok(size)
    }

    /// Replace the transmitter, returning it.
    ///
    /// The previous transmitter is dropped once no other copy refers to it.
    pub fn register_tx(&mut self, tx: SharedTx) -> SharedTx {
        self.tx = tx;
        self.tx.clone()
    }

    /// Replace the capture capability, returning it.
    ///
    /// The previous capability (and its device) is dropped once no other copy refers to it.
    pub fn register_rx(&mut self, rx: SharedRx) -> SharedRx {
        self.rx = rx;
        self.rx.clone()
    }

    /// The current transmitter, reference counted.
    pub fn tx(&self) -> SharedTx {
        self.tx.clone()
    }

    /// The current capture capability, reference counted.
    pub fn rx(&self) -> SharedRx {
        self.rx.clone()
    }

    /// Borrow the current transmitter. The borrow cannot outlive this engine.
    pub fn raw_tx(&self) -> Ref<'_, dyn Tx> {
        self.tx.borrow()
    }

    pub fn raw_tx_mut(&self) -> RefMut<'_, dyn Tx> {
        self.tx.borrow_mut()
    }

    /// Borrow the current capture capability. The borrow cannot outlive this engine.
    pub fn raw_rx(&self) -> Ref<'_, dyn Rx> {
        self.rx.borrow()
    }

    pub fn raw_rx_mut(&self) -> RefMut<'_, dyn Rx> {
        self.rx.borrow_mut()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::capabilities::{Loopback, LoopbackRx, LoopbackTx};

    fn loopback_layer2() -> (Loopback, Rc<RefCell<LoopbackRx>>, Rc<RefCell<LoopbackTx>>, Layer2) {
        let loopback = Loopback::new();
        let rx = Rc::new(RefCell::new(loopback.rx()));
        let tx = Rc::new(RefCell::new(loopback.tx()));
        let layer2 = Layer2::with_capabilities(Config::default(), rx.clone(), tx.clone());
        (loopback, rx, tx, layer2)
    }

    #[test]
    fn test_sendpack_sniffpack() {
        let (_, _, tx, mut layer2) = loopback_layer2();
        layer2.init_device("lo", false, 1500).unwrap();

        assert_eq!(layer2.sendpack(&[1, 2, 3]).unwrap(), 3);
        assert_eq!(tx.borrow().sent(), 1);

        let mut buffer = [0u8; 16];
        let mut offset = 0;
        assert_eq!(layer2.sniffpack(&mut buffer, &mut offset).unwrap(), 3);
        assert_eq!(offset, 0);
        assert_eq!(&buffer[..3], &[1, 2, 3]);
        assert_eq!(layer2.bytes_received(), 3);

        assert_eq!(layer2.sniffpack(&mut buffer, &mut offset).unwrap(), 0);
        assert!(layer2.timed_out());
    }

    #[test]
    fn test_filter_and_timeout() {
        let (_, rx, _, mut layer2) = loopback_layer2();
        layer2.set_filter("arp").unwrap();
        layer2.set_timeout(Some(Duration::from_millis(100)));
        assert_eq!(layer2.filter().as_deref(), Some("arp"));
        assert_eq!(rx.borrow().timeout(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_clone_shares_capabilities() {
        let (_, rx, tx, layer2) = loopback_layer2();
        assert_eq!(Rc::strong_count(&rx), 2);

        let copy = layer2.clone();
        assert_eq!(Rc::strong_count(&rx), 3);
        assert_eq!(Rc::strong_count(&tx), 3);
        assert!(Rc::ptr_eq(&copy.rx(), &layer2.rx()));

        drop(copy);
        drop(layer2);
        assert_eq!(Rc::strong_count(&rx), 1);
        assert_eq!(Rc::strong_count(&tx), 1);
    }

    #[test]
    fn test_register_tx_releases_previous() {
        let (loopback, _, tx, mut layer2) = loopback_layer2();
        let copy = layer2.clone();

        let other: SharedTx = Rc::new(RefCell::new(loopback.tx()));
        let registered = layer2.register_tx(other.clone());
        assert!(Rc::ptr_eq(&registered, &other));
        // Still held by `copy`.
        assert_eq!(Rc::strong_count(&tx), 2);

        drop(copy);
        assert_eq!(Rc::strong_count(&tx), 1);
    }

    #[test]
    fn test_ethernet_binds_to_capture_device() {
        let layer2 = Layer2::ethernet(Config::default());
        let device = layer2.raw_rx().device().unwrap();
        // The engine's capture capability keeps the slot alive, the transmitter does not.
        assert_eq!(device.strong_count(), 1);

        let mut layer2 = layer2;
        // No device opened yet.
        assert!(layer2.sendpack(&[0u8; 4]).is_err());
    }
}
