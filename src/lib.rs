#![doc = include_str!("../README.md")]

pub mod capabilities;
pub mod checksum;
pub mod config;
pub mod error;
pub mod layer2;
pub mod protocols;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use layer2::Layer2;
pub use protocols::*;
