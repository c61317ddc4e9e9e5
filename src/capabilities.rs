//! Capture and transmit capabilities.
//!
//! A [`Layer2`](crate::layer2::Layer2) engine talks to the network only through
//! an [`Rx`] (capture) and a [`Tx`] (transmit) capability. The libpcap-backed
//! pair shares one device: [`PcapRx`] owns it, [`EthernetTx`] only holds a weak
//! reference to it, so that transmitters can be swapped in and out while the
//! capture device stays open.
//!
//! # Examples
//!
//! ```
//! use rawlayer::capabilities::{Loopback, Rx, Tx};
//!
//! let loopback = Loopback::new();
//! let mut rx = loopback.rx();
//! let mut tx = loopback.tx();
//! rx.init("lo", false, 0).unwrap();
//!
//! tx.transmit(&[0x00, 0x01, 0x08, 0x00]).unwrap();
//!
//! let mut buffer = [0u8; 16];
//! assert_eq!(rx.receive(&mut buffer).unwrap(), 4);
//! assert_eq!(rx.bytes_received(), 4);
//! ```
mod loopback;
mod rx;
mod tx;

pub use loopback::*;
pub use rx::*;
pub use tx::*;

use std::cell::RefCell;
use std::rc::Rc;

/// A capture capability shared between clones of a protocol object.
pub type SharedRx = Rc<RefCell<dyn Rx>>;

/// A transmit capability shared between clones of a protocol object.
pub type SharedTx = Rc<RefCell<dyn Tx>>;
