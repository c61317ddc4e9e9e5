//! Protocol objects built on top of the [`Layer2`](crate::layer2::Layer2) engine.
//!
//! [`Arp`] is a standalone layer 2 protocol. [`Tcp`] composes over any
//! [`NetworkLayer`], and is available as [`Tcp4`] (over [`Ip`]) and [`Tcp6`]
//! (over [`Ip6`]).
//!
//! # Examples
//!
//! ```no_run
//! use std::net::Ipv4Addr;
//! use pnet::packet::tcp::TcpFlags;
//! use rawlayer::config::Config;
//! use rawlayer::protocols::Tcp4;
//!
//! let mut tcp = Tcp4::new(Ipv4Addr::new(192, 0, 2, 1), Config::default());
//! tcp.init_device("eth0", false, 1500).unwrap();
//! tcp.set_dstport(80);
//! tcp.set_flags(TcpFlags::SYN as u16);
//! tcp.sendpack(&[]).unwrap();
//! ```
mod arp;
mod ip;
mod ip6;
mod network;
mod tcp;

pub use arp::*;
pub use ip::*;
pub use ip6::*;
pub use network::*;
pub use tcp::*;
