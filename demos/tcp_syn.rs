//! Probe a TCP port with a single SYN segment and report the answer.
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use log::{debug, info};
use pnet::packet::tcp::TcpFlags;
use pnet::util::MacAddr;
use rand::{thread_rng, Rng};
use rawlayer::protocols::{NetworkLayer, Tcp4};
use rawlayer::{Config, ErrorKind};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Interface from which to send the probe.
    #[arg(short = 'i', long)]
    interface: String,
    /// Hardware address of the interface.
    #[arg(long, default_value_t = MacAddr::zero())]
    source_mac: MacAddr,
    /// Hardware address of the next hop.
    #[arg(short = 'g', long)]
    gateway_mac: MacAddr,
    /// Protocol address of the interface.
    #[arg(short = 'S', long)]
    source_ip: Ipv4Addr,
    /// Source port (random by default).
    #[arg(long, default_value_t = thread_rng().gen_range(1024..u16::MAX))]
    sport: u16,
    /// Destination port.
    #[arg(short = 'p', long, default_value_t = 80)]
    port: u16,
    /// Time in seconds to wait for an answer.
    #[arg(short = 'w', long, default_value_t = 2)]
    wait: u64,
    /// The host to probe.
    #[arg(index = 1)]
    target: Ipv4Addr,
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

    let mut tcp = Tcp4::new(args.target, config);
    tcp.init_device(&args.interface, false, 1500)?;
    tcp.network_mut().set_src(args.source_ip);
    tcp.network_mut().set_l2_source(args.source_mac);
    tcp.network_mut().set_l2_destination(args.gateway_mac);

    tcp.set_srcport(args.sport);
    tcp.set_dstport(args.port);
    tcp.set_flags(TcpFlags::SYN as u16);
    // Maximum segment size: 1460.
    tcp.set_options(&[2, 4, 0x05, 0xb4])?;
    let seq = tcp.get_seq();
    tcp.sendpack(&[])?;
    debug!("syn sent seq={} sport={}", seq, args.sport);

    let start = Instant::now();
    let mut buffer = vec![0u8; 65535];
    while start.elapsed() < wait {
        let mut offset = 0;
        let size = match tcp.sniffpack(&mut buffer, &mut offset) {
            Ok(size) => size,
            Err(error) if error.kind() == ErrorKind::Framing => continue,
            Err(error) => return Err(error.into()),
        };
        if size == 0 && tcp.layer2().timed_out() {
            break;
        }
        if tcp.network().get_src() != args.target
            || tcp.get_srcport() != args.port
            || tcp.get_dstport() != args.sport
        {
            continue;
        }

        let flags = tcp.get_flags();
        let state = if flags & TcpFlags::RST as u16 != 0 {
            "closed"
        } else if flags & (TcpFlags::SYN | TcpFlags::ACK) as u16
            == (TcpFlags::SYN | TcpFlags::ACK) as u16
        {
            "open"
        } else {
            continue;
        };
        println!(
            "{}:{} {} ack={} time={:?}",
            args.target,
            args.port,
            state,
            tcp.get_ack().wrapping_sub(seq),
            start.elapsed()
        );
        return Ok(());
    }

    println!("{}:{} filtered", args.target, args.port);
    Ok(())
}
