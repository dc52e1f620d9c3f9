use std::net::{Ipv4Addr, SocketAddrV4};

use crate::capture::{CaptureLog, CaptureRecord};
use crate::mailbox::{LoopTime, Mailbox};
use crate::net::{BulkSender, NetWorld, Sink};
use crate::proto::tcp::TcpConfig;
use crate::wire::{encode_datagram, SeqNum, TcpFlags, TcpHeader, IP_PROTO_TCP};

#[test]
fn record_decodes_tcp_datagram() {
    let src = Ipv4Addr::new(10, 0, 0, 1);
    let dst = Ipv4Addr::new(10, 0, 0, 2);
    let mut hdr = TcpHeader {
        src_port: 4096,
        dst_port: 80,
        seq: SeqNum(100),
        ack: SeqNum(200),
        flags: TcpFlags::SYN | TcpFlags::ACK,
        wnd: 4096,
        ..TcpHeader::default()
    };
    hdr.fill_checksum([&b"abc"[..]], src, dst);
    let mut tcp = hdr.to_bytes();
    tcp.extend_from_slice(b"abc");
    let bytes = encode_datagram(src, dst, IP_PROTO_TCP, 1, &tcp);

    let rec = CaptureRecord::from_datagram(42, "a", "b", &bytes, true).expect("record");
    assert_eq!(rec.flags, "SYN|ACK");
    assert_eq!((rec.src_port, rec.dst_port), (4096, 80));
    assert_eq!((rec.seq, rec.ack, rec.len, rec.wnd), (100, 200, 3, 4096));
    assert!(rec.dropped);

    let udp = encode_datagram(src, dst, 17, 1, &tcp);
    assert!(CaptureRecord::from_datagram(0, "a", "b", &udp, false).is_none());
    assert!(CaptureRecord::from_datagram(0, "a", "b", &bytes[..10], false).is_none());
}

#[test]
fn capture_follows_a_lossy_transfer() {
    let mut world = NetWorld::default();
    let a = world.net.add_host("client", Ipv4Addr::new(10, 0, 0, 1), TcpConfig::default());
    let b = world.net.add_host("server", Ipv4Addr::new(10, 0, 0, 2), TcpConfig::default());
    world.net.connect(a, b, LoopTime::from_millis(2), Some(4));
    world.net.capture = Some(CaptureLog::default());
    world.net.set_app(b, Sink::new(80));
    world
        .net
        .set_app(a, BulkSender::new(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 80), 10_000));

    let mut mb = Mailbox::default();
    world.net.flush(&mut mb);
    mb.run_until(LoopTime::from_secs(30), &mut world);

    let cap = world.net.capture.take().expect("capture enabled");
    assert_eq!(cap.records.len() as u64, world.net.stats.datagrams);
    let first = &cap.records[0];
    assert_eq!((first.from.as_str(), first.to.as_str()), ("client", "server"));
    assert_eq!(first.flags, "SYN");
    let dropped = cap.records.iter().filter(|r| r.dropped).count() as u64;
    assert_eq!(dropped, world.net.stats.dropped);
    assert!(dropped > 0);
    assert!(cap.records.windows(2).all(|w| w[0].t_ns <= w[1].t_ns));

    let json = cap.to_json().expect("json");
    let back: Vec<CaptureRecord> = serde_json::from_str(&json).expect("parse");
    assert_eq!(back, cap.records);
}
