use std::net::{Ipv4Addr, SocketAddrV4};

use crate::proto::tcp::{Ccb, ConnId, ConnTable, Slot, TcpConfig, TcpState};
use crate::wire::SeqNum;

use super::harness::{a, b};

fn ccb(n: u64, state: TcpState, local: SocketAddrV4, remote: SocketAddrV4) -> Ccb {
    let mut c = Ccb::new(ConnId(n), TcpConfig::default(), SeqNum(0), 0);
    c.state = state;
    c.local = local;
    c.remote = remote;
    c
}

fn any(port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)
}

#[test]
fn table_active_hit_moves_to_front() {
    let mut t = ConnTable::default();
    t.register(ccb(1, TcpState::Established, a(1000), b(80)));
    t.register(ccb(2, TcpState::Established, a(1001), b(80)));
    assert_eq!(t.active().next().map(|c| c.id), Some(ConnId(2)));

    assert_eq!(t.find(a(1000), b(80)), Some(Slot::Active));
    assert_eq!(t.slot(Slot::Active).map(|c| c.id), Some(ConnId(1)));
    assert_eq!(t.active().next().map(|c| c.id), Some(ConnId(1)));
    assert_eq!(t.find(a(1000), b(81)), None);
}

#[test]
fn table_time_wait_hit_keeps_order() {
    let mut t = ConnTable::default();
    t.register(ccb(1, TcpState::TimeWait, a(1000), b(80)));
    t.register(ccb(2, TcpState::TimeWait, a(1001), b(80)));
    assert_eq!(t.find(a(1000), b(80)), Some(Slot::TimeWait(1)));
    assert_eq!(t.slot(Slot::TimeWait(1)).map(|c| c.id), Some(ConnId(1)));
    let ids: Vec<_> = t.time_wait().map(|c| c.id).collect();
    assert_eq!(ids, vec![ConnId(2), ConnId(1)]);
}

#[test]
fn table_listener_matches_port_and_wildcard() {
    let mut t = ConnTable::default();
    t.register(ccb(1, TcpState::Listen, any(80), any(0)));
    t.register(ccb(2, TcpState::Listen, SocketAddrV4::new(Ipv4Addr::new(10, 9, 9, 9), 81), any(0)));

    assert_eq!(t.find(a(80), b(5000)), Some(Slot::Listen));
    assert_eq!(t.slot(Slot::Listen).map(|c| c.id), Some(ConnId(1)));
    // 地址不同的具体绑定不匹配
    assert_eq!(t.find(a(81), b(5000)), None);

    // 精确匹配的活动连接优先于监听
    t.register(ccb(3, TcpState::SynRcvd, a(80), b(5000)));
    assert_eq!(t.find(a(80), b(5000)), Some(Slot::Active));
    assert_eq!(t.find(a(80), b(5001)), Some(Slot::Listen));
}

#[test]
fn table_bookkeeping() {
    let mut t = ConnTable::default();
    t.register(ccb(1, TcpState::Listen, any(80), any(0)));
    t.register(ccb(2, TcpState::Established, a(1000), b(80)));
    t.register(ccb(3, TcpState::TimeWait, a(1001), b(80)));
    assert_eq!(t.len(), 3);
    assert!(t.local_in_use(a(80)));
    assert!(t.local_in_use(any(1000)));
    assert!(!t.local_in_use(a(1001)));
    assert!(t.port_in_use(1001));

    let c = t.remove(ConnId(2)).expect("present");
    assert_eq!(c.id, ConnId(2));
    assert!(t.get(ConnId(2)).is_none());
    assert_eq!(t.len(), 2);
    assert!(t.remove(ConnId(2)).is_none());
}
