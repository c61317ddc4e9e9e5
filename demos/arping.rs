//! Resolve the hardware address of an IPv4 host with ARP requests.
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use clap::Parser;
use log::{debug, info};
use pnet::packet::arp::ArpOperations;
use pnet::util::MacAddr;
use rawlayer::protocols::{Arp, ARP_HEADER_SIZE};
use rawlayer::{Config, ErrorKind};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Interface from which to send the requests.
    #[arg(short = 'i', long)]
    interface: String,
    /// Hardware address of the interface.
    #[arg(short = 's', long, default_value_t = MacAddr::zero())]
    source_mac: MacAddr,
    /// Protocol address of the interface.
    #[arg(short = 'S', long, default_value_t = Ipv4Addr::UNSPECIFIED)]
    source_ip: Ipv4Addr,
    /// Number of requests to send.
    #[arg(short = 'c', long, default_value_t = 3)]
    count: u32,
    /// Time in seconds to wait for a reply.
    #[arg(short = 'w', long, default_value_t = 1)]
    wait: u64,
    /// The host to resolve.
    #[arg(index = 1)]
    target: Ipv4Addr,
}

fn mac_octets(mac: MacAddr) -> [u8; 6] {
    [mac.0, mac.1, mac.2, mac.3, mac.4, mac.5]
}

/// Sender and target addresses of an Ethernet/IPv4 request.
fn request_addresses(args: &Args) -> Vec<u8> {
    let mut payload = Vec::with_capacity(20);
    payload.extend_from_slice(&mac_octets(args.source_mac));
    payload.extend_from_slice(&args.source_ip.octets());
    payload.extend_from_slice(&[0u8; 6]);
    payload.extend_from_slice(&args.target.octets());
    payload
}

/// Sender hardware address of a reply, if it answers for `target`.
fn parse_reply(message: &[u8], target: Ipv4Addr) -> Option<MacAddr> {
    let addresses = message.get(ARP_HEADER_SIZE..ARP_HEADER_SIZE + 20)?;
    let sender_ip = Ipv4Addr::new(addresses[6], addresses[7], addresses[8], addresses[9]);
    if sender_ip != target {
        return None;
    }
    Some(MacAddr::new(
        addresses[0],
        addresses[1],
        addresses[2],
        addresses[3],
        addresses[4],
        addresses[5],
    ))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let wait = Duration::from_secs(args.wait);
    let config = Config {
        timeout: Some(wait),
        ..Default::default()
    };
    info!("{}", config);

    let mut arp = Arp::new(config);
    arp.init_device(&args.interface, false, 1500)?;
    arp.set_l2_source(args.source_mac);

    let request = request_addresses(&args);
    let mut buffer = [0u8; 1500];
    let mut answered = 0;

    for seq in 0..args.count {
        arp.set_op(ArpOperations::Request);
        arp.sendpack(&request)?;
        let start = Instant::now();
        debug!("request seq={} target={}", seq, args.target);

        while start.elapsed() < wait {
            let mut offset = 0;
            let size = match arp.sniffpack(&mut buffer, &mut offset) {
                Ok(size) => size,
                Err(error) if error.kind() == ErrorKind::Framing => continue,
                Err(error) => return Err(error.into()),
            };
            if size == 0 {
                break;
            }
            if arp.get_op() != ArpOperations::Reply {
                continue;
            }
            if let Some(mac) = parse_reply(&buffer[offset..size], args.target) {
                println!(
                    "reply from {} [{}] seq={} time={:?}",
                    args.target,
                    mac,
                    seq,
                    start.elapsed()
                );
                answered += 1;
                break;
            }
        }
    }

    if answered == 0 {
        bail!("no reply from {}", args.target);
    }
    Ok(())
}
