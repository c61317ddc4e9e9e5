use std::cell::RefCell;
use std::rc::Rc;

use pnet::packet::arp::ArpOperations;
use pnet::packet::ethernet::EtherTypes;
use pnet::util::MacAddr;
use rawlayer::capabilities::{Loopback, LoopbackRx, LoopbackTx, Rx};
use rawlayer::protocols::{Arp, ArpHeader, ARP_HEADER_SIZE};
use rawlayer::{Config, Error, ErrorKind, Layer2};

fn loopback_arp() -> (
    Loopback,
    Rc<RefCell<LoopbackRx>>,
    Rc<RefCell<LoopbackTx>>,
    Arp,
) {
    let loopback = Loopback::new();
    let rx = Rc::new(RefCell::new(loopback.rx()));
    let tx = Rc::new(RefCell::new(loopback.tx()));
    let layer2 = Layer2::with_capabilities(Config::default(), rx.clone(), tx.clone());
    let mut arp = Arp::with_layer2(layer2);
    arp.init_device("lo", false, 1500).unwrap();
    (loopback, rx, tx, arp)
}

/// Sender and target addresses of an Ethernet/IPv4 ARP message.
fn addresses() -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
    payload.extend_from_slice(&[192, 0, 2, 1]);
    payload.extend_from_slice(&[0x00; 6]);
    payload.extend_from_slice(&[192, 0, 2, 2]);
    payload
}

#[test]
fn test_default_op_is_request() {
    let arp = Arp::new(Config::default());
    assert_eq!(arp.get_op(), ArpOperations::Request);
    assert_eq!(*arp.header(), ArpHeader::default());
}

#[test]
fn test_init_device() {
    let (_, rx, tx, _) = loopback_arp();
    assert_eq!(rx.borrow().device_name(), Some("lo"));
    assert_eq!(rx.borrow().filter().as_deref(), Some("arp"));
    assert_eq!(tx.borrow().frame_type(), EtherTypes::Arp);
    assert!(tx.borrow().is_broadcast());
    assert_eq!(tx.borrow().destination(), MacAddr::broadcast());
}

#[test]
fn test_sendpack_sniffpack() {
    let (_, _, tx, mut arp) = loopback_arp();
    let payload = addresses();
    arp.set_op(ArpOperations::Reply);
    let sent_header = *arp.header();

    assert_eq!(arp.sendpack(&payload).unwrap(), ARP_HEADER_SIZE + payload.len());
    assert_eq!(tx.borrow().sent(), 1);

    // Forget the header state before capturing.
    arp.set_op(ArpOperations::Request);

    let mut buffer = [0u8; 128];
    let mut offset = 0;
    let size = arp.sniffpack(&mut buffer, &mut offset).unwrap();
    assert_eq!(size, ARP_HEADER_SIZE + payload.len());
    assert_eq!(*arp.header(), sent_header);
    assert_eq!(arp.get_op(), ArpOperations::Reply);
    assert_eq!(&buffer[size - payload.len()..size], payload.as_slice());
}

#[test]
fn test_sniffpack_keeps_offset() {
    let (loopback, _, _, mut arp) = loopback_arp();
    let header = ArpHeader {
        operation: ArpOperations::Reply,
        ..Default::default()
    };

    let mut frame = vec![0xee, 0xee];
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(&addresses());
    loopback.inject(&frame);

    let mut buffer = [0u8; 128];
    let mut offset = 2;
    let size = arp.sniffpack(&mut buffer, &mut offset).unwrap();
    assert_eq!(offset, 2);
    assert_eq!(size, frame.len());
    assert_eq!(arp.get_op(), ArpOperations::Reply);
    // The returned range still starts with the ARP header.
    assert_eq!(&buffer[offset..offset + ARP_HEADER_SIZE], &header.to_bytes());
}

#[test]
fn test_sniff_payload_includes_header() {
    let (_, _, _, mut arp) = loopback_arp();
    let payload = addresses();
    arp.sendpack(&payload).unwrap();

    let message = arp.sniff_payload().unwrap();
    assert_eq!(message.len(), ARP_HEADER_SIZE + payload.len());
    assert_eq!(&message[..ARP_HEADER_SIZE], &arp.header().to_bytes());
    assert_eq!(&message[ARP_HEADER_SIZE..], payload.as_slice());
}

#[test]
fn test_sendpack_too_large() {
    let (loopback, _, tx, mut arp) = loopback_arp();
    let max = arp.layer2().max_packet_size();

    assert!(arp.sendpack(&vec![0u8; max - ARP_HEADER_SIZE]).is_ok());
    assert_eq!(loopback.pending(), 1);

    let error = arp
        .sendpack(&vec![0u8; max - ARP_HEADER_SIZE + 1])
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Size);
    assert_eq!(tx.borrow().sent(), 1);
    assert_eq!(loopback.pending(), 1);
}

#[test]
fn test_sniffpack_short_packet() {
    let (loopback, _, _, mut arp) = loopback_arp();
    arp.set_op(ArpOperations::Reply);

    for initial_offset in [0, 3] {
        loopback.inject(&[0x00, 0x01, 0x08, 0x00, 0x06]);
        let mut buffer = [0u8; 128];
        let mut offset = initial_offset;
        let result = arp.sniffpack(&mut buffer, &mut offset);
        assert!(matches!(result, Err(Error::Framing { .. })));
        assert_eq!(arp.get_op(), ArpOperations::Reply);
    }
}

#[test]
fn test_sniffpack_timeout() {
    let (_, rx, _, mut arp) = loopback_arp();
    let mut buffer = [0u8; 128];
    let mut offset = 0;
    assert_eq!(arp.sniffpack(&mut buffer, &mut offset).unwrap(), 0);
    assert!(arp.layer2().timed_out());
    assert!(rx.borrow().timed_out());
    assert_eq!(arp.get_op(), ArpOperations::Request);
}

#[test]
fn test_clone_shares_device() {
    let (_, _, tx, mut arp) = loopback_arp();
    let mut copy = arp.clone();
    copy.set_op(ArpOperations::Reply);
    assert_eq!(arp.get_op(), ArpOperations::Request);

    copy.sendpack(&addresses()).unwrap();
    assert_eq!(tx.borrow().sent(), 1);

    let message = arp.sniff_payload().unwrap();
    assert!(!message.is_empty());
    assert_eq!(arp.get_op(), ArpOperations::Reply);
    assert_eq!(arp.layer2().bytes_received(), copy.layer2().bytes_received());
}

#[test]
fn test_l2_addresses_forwarded() {
    let (_, _, tx, mut arp) = loopback_arp();
    let source = MacAddr::new(0x02, 0, 0, 0, 0, 0x01);
    let destination = MacAddr::new(0x02, 0, 0, 0, 0, 0x02);
    arp.set_l2_source(source);
    arp.set_l2_destination(destination);
    assert_eq!(tx.borrow().source(), source);
    assert_eq!(tx.borrow().destination(), destination);
    assert!(!tx.borrow().is_broadcast());
}
