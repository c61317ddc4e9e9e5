//! Errors returned by the capture/transmit capabilities and the protocol layers.
use strum::{Display, EnumString};

pub type Result<T> = std::result::Result<T, Error>;

/// The broad class of an [`Error`].
///
/// A capture timeout is not an error (`sniffpack` returns `Ok(0)`), the
/// `Timeout` kind only exists so that callers can classify their own loops.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Size,
    Framing,
    Timeout,
    Os,
    InvalidInput,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{layer}: packet of {size} bytes exceeds the maximum of {max} bytes")]
    Size {
        layer: &'static str,
        size: usize,
        max: usize,
    },
    #[error("{layer}: short packet ({available} bytes available, {required} required)")]
    Framing {
        layer: &'static str,
        available: usize,
        required: usize,
    },
    #[error("invalid TCP options length: {0} (must be a multiple of 4, at most 40)")]
    Options(usize),
    #[error("capture device error: {0}")]
    Pcap(#[from] pcap::Error),
    #[error("no capture device initialized")]
    NoDevice,
    #[error("unsupported link type: {0}")]
    Linktype(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Size { .. } => ErrorKind::Size,
            Error::Framing { .. } => ErrorKind::Framing,
            Error::Options(_) => ErrorKind::InvalidInput,
            Error::Pcap(pcap::Error::TimeoutExpired) => ErrorKind::Timeout,
            Error::Pcap(_) | Error::NoDevice | Error::Linktype(_) => ErrorKind::Os,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        let error = Error::Size {
            layer: "ARP",
            size: 2000,
            max: 1500,
        };
        assert_eq!(error.kind(), ErrorKind::Size);
        assert_eq!(error.kind().to_string(), "size");
        assert_eq!(Error::NoDevice.kind(), ErrorKind::Os);
        assert_eq!(Error::Options(3).kind(), ErrorKind::InvalidInput);
        assert_eq!("framing".parse::<ErrorKind>().unwrap(), ErrorKind::Framing);
    }
}
