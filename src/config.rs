//! Engine configuration shared by every protocol layer.
use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Maximum frame size (excluding the link-layer framing): the Ethernet MTU.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1500;

/// Default snapshot length passed to the capture device.
pub const DEFAULT_SNAPLEN: usize = 65535;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Ceiling on headers of all layers plus payload, checked before any write.
    pub max_packet_size: usize,
    /// Capture timeout applied when the device is opened (blocks forever if unset).
    pub timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            timeout: None,
        }
    }
}

impl Display for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "max_packet_size={:?}", self.max_packet_size)?;
        write!(f, " timeout={:?}", self.timeout)
    }
}
