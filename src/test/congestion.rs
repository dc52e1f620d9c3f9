use crate::proto::tcp::{CcbFlags, TcpConfig};
use crate::wire::TcpFlags;

use super::harness::{Scripted, ISS};

/// 对端 MSS 为 100；写 400 字节后确认前两段，留下两段在途。
fn two_in_flight() -> Scripted {
    let mut s = Scripted::established(TcpConfig::default(), 100, 8760);
    assert_eq!(s.stack.ccb(s.id).expect("ccb").mss, 100);
    s.stack.write(s.id, &[7u8; 400], &mut s.wire).expect("write");
    let sent = s.wire.take();
    assert_eq!(sent.len(), 4);
    assert!(sent.iter().all(|o| o.payload.len() == 100));

    s.ack(ISS + 101, 8760);
    s.ack(ISS + 201, 8760);
    let ccb = s.stack.ccb(s.id).expect("ccb");
    assert_eq!(ccb.unacked.len(), 2);
    assert_eq!(ccb.unacked[0].seq().0, ISS + 201);
    assert_eq!(ccb.snd_max.0, ISS + 401);
    s.wire.take();
    s.rec.clear();
    s
}

#[test]
fn third_duplicate_ack_triggers_one_fast_retransmit() {
    let mut s = two_in_flight();

    s.ack(ISS + 201, 8760);
    s.ack(ISS + 201, 8760);
    assert!(s.wire.take().is_empty());
    assert_eq!(s.stack.ccb(s.id).expect("ccb").dupacks, 2);

    s.ack(ISS + 201, 8760);
    let out = s.wire.take();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].hdr.seq.0, ISS + 201);
    assert_eq!(out[0].payload.len(), 100);
    assert_eq!(s.stack.stats.rexmit, 1);

    let ccb = s.stack.ccb(s.id).expect("ccb");
    assert!(ccb.flags.contains(CcbFlags::INFR));
    // 在途 200 字节的一半不足 2·MSS
    assert_eq!(ccb.ssthresh, 200);
    assert_eq!(ccb.cwnd, 200 + 3 * 100);

    s.ack(ISS + 201, 8760);
    assert!(s.wire.take().is_empty(), "no second fast retransmit");
    assert_eq!(s.stack.ccb(s.id).expect("ccb").cwnd, 600);
    assert_eq!(s.stack.stats.rexmit, 1);
}

#[test]
fn new_ack_ends_fast_recovery() {
    let mut s = two_in_flight();
    for _ in 0..3 {
        s.ack(ISS + 201, 8760);
    }
    s.ack(ISS + 401, 8760);
    let ccb = s.stack.ccb(s.id).expect("ccb");
    assert!(!ccb.flags.contains(CcbFlags::INFR));
    assert!(ccb.unacked.is_empty());
    assert_eq!(ccb.dupacks, 0);
    // 回落到 ssthresh 后按拥塞避免增长一次
    assert_eq!(ccb.cwnd, 200 + 100 * 100 / 200);
}

#[test]
fn duplicate_acks_carrying_data_trigger_fast_retransmit() {
    let mut s = two_in_flight();
    for i in 0..3u32 {
        let seq = s.rcv_nxt();
        s.deliver(seq, ISS + 201, TcpFlags::ACK, 8760, &[i as u8; 10]);
    }
    assert_eq!(s.rec.data(), vec![0u8; 10].into_iter().chain([1; 10]).chain([2; 10]).collect::<Vec<_>>());

    let ccb = s.stack.ccb(s.id).expect("ccb");
    assert_eq!(ccb.dupacks, 3);
    assert!(ccb.flags.contains(CcbFlags::INFR));
    assert_eq!(ccb.cwnd, 200 + 3 * 100);
    assert_eq!(s.stack.stats.rexmit, 1);
    let resent: Vec<u32> = s
        .wire
        .take()
        .iter()
        .filter(|o| !o.payload.is_empty())
        .map(|o| o.hdr.seq.0)
        .collect();
    assert_eq!(resent, vec![ISS + 201]);
}

#[test]
fn duplicate_acks_with_window_updates_still_count() {
    let mut s = two_in_flight();
    s.ack(ISS + 201, 9000);
    s.ack(ISS + 201, 9500);
    assert_eq!(s.stack.stats.rexmit, 0);
    s.ack(ISS + 201, 10_000);
    assert_eq!(s.stack.ccb(s.id).expect("ccb").snd_wnd, 10_000);
    assert_eq!(s.stack.stats.rexmit, 1);
}

#[test]
fn duplicate_acks_without_unacked_data_do_not_retransmit() {
    let mut s = Scripted::established(TcpConfig::default(), 1460, 8760);
    for _ in 0..4 {
        s.ack(ISS + 1, 8760);
    }
    let ccb = s.stack.ccb(s.id).expect("ccb");
    assert_eq!(ccb.dupacks, 4);
    assert!(!ccb.flags.contains(CcbFlags::INFR));
    assert_eq!(s.stack.stats.rexmit, 0);
    assert!(s.wire.take().is_empty());
}

#[test]
fn slow_start_grows_window_per_ack() {
    let mut s = Scripted::established(TcpConfig::default(), 1460, 8760);
    s.stack.write(s.id, &[1u8; 8760], &mut s.wire).expect("write");
    let round1 = s.wire.take();
    assert_eq!(round1.len(), 1);

    s.ack(ISS + 1 + 1460, 8760);
    let round2 = s.wire.take();
    assert_eq!(round2.len(), 2);
    assert_eq!(s.stack.ccb(s.id).expect("ccb").cwnd, 2920);

    s.ack(ISS + 1 + 3 * 1460, 8760);
    let round3 = s.wire.take();
    assert_eq!(round3.len(), 3);
    assert_eq!(s.stack.ccb(s.id).expect("ccb").cwnd, 4380);
}

#[test]
fn congestion_avoidance_grows_by_mss_squared_over_cwnd() {
    let mut s = Scripted::established(TcpConfig::default(), 1000, 8760);
    {
        let ccb = s.stack.table.get_mut(s.id).expect("ccb");
        ccb.cwnd = 4000;
        ccb.ssthresh = 3000;
    }
    s.stack.write(s.id, &[1u8; 2000], &mut s.wire).expect("write");
    assert_eq!(s.wire.take().len(), 2);
    s.ack(ISS + 1001, 8760);
    let cwnd = u32::from(s.stack.ccb(s.id).expect("ccb").cwnd);
    assert_eq!(cwnd, 4000 + 1000 * 1000 / 4000);
}

#[test]
fn send_window_limits_flight() {
    let mut s = Scripted::established(TcpConfig::default(), 1460, 1000);
    s.stack.write(s.id, &[1u8; 3000], &mut s.wire).expect("write");
    assert!(s.wire.take().is_empty(), "first segment does not fit the peer window");

    s.ack(ISS + 1, 4000);
    let out = s.wire.take();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].payload.len(), 1460);
}
