use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex};

use crate::mailbox::{LoopTime, Mailbox};
use crate::net::{
    BulkSender, Close, HostId, LinkId, NetWorld, OpenActive, OpenListen, Sink, Write,
};
use crate::proto::tcp::{ConnId, TcpConfig, TcpError, TcpState};

use super::harness::{Ev, Recorder};

const CLIENT: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const SERVER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

/// TIME_WAIT（2·MSL = 60 s）要长过对端 LAST_ACK 退避后的重传间隔，
/// 否则迟到的 FIN 重传会撞上已回收的连接并被 RST。
fn quick_cfg() -> TcpConfig {
    TcpConfig {
        msl_ms: 30_000,
        ..TcpConfig::default()
    }
}

fn two_hosts(drop_every: Option<u64>) -> (NetWorld, HostId, HostId) {
    let mut world = NetWorld::default();
    let client = world.net.add_host("client", CLIENT, quick_cfg());
    let server = world.net.add_host("server", SERVER, quick_cfg());
    world
        .net
        .connect(client, server, LoopTime::from_millis(5), drop_every);
    (world, client, server)
}

fn bulk(drop_every: Option<u64>, total: u64) -> (NetWorld, Mailbox, HostId, HostId) {
    let (mut world, client, server) = two_hosts(drop_every);
    let sink = Sink::new(80);
    let sink_progress = sink.progress();
    world.net.set_app(server, sink);
    let sender = BulkSender::new(SocketAddrV4::new(SERVER, 80), total);
    let sender_progress = sender.progress();
    world.net.set_app(client, sender);

    let mut mb = Mailbox::default();
    world.net.flush(&mut mb);
    mb.run(&mut world);

    let sp = sender_progress.lock().expect("progress").clone();
    let rp = sink_progress.lock().expect("progress").clone();
    assert_eq!(sp.error, None);
    assert_eq!(rp.error, None);
    assert_eq!(sp.written, total);
    assert!(sp.closed);
    assert_eq!(rp.received, total);
    assert_eq!(rp.first_mismatch, None);
    assert!(rp.peer_closed && rp.closed);
    // 数据、FIN 各占序号；SYN 在主动方不计入 sent
    assert_eq!(sp.acked, total + 1);
    (world, mb, client, server)
}

#[test]
fn bulk_transfer_completes_and_timers_go_idle() {
    let (world, mb, client, server) = bulk(None, 64_000);
    assert_eq!(mb.pending(), 0, "loop drains once TIME_WAIT expires");
    assert!(mb.now() >= LoopTime::from_secs(60), "TIME_WAIT lasted two MSL");

    let c = world.net.host(client).expect("client");
    let s = world.net.host(server).expect("server");
    assert_eq!(c.tcp.connection_count(), 0);
    assert_eq!(s.tcp.connection_count(), 1, "only the listener remains");
    assert_eq!(c.tcp.stats.rexmit, 0);
    assert_eq!(world.net.stats.dropped, 0);
    assert_eq!(world.net.stats.delivered, world.net.stats.datagrams);
    assert!(world.net.link(LinkId(0)).expect("link").sent > 0);
}

#[test]
fn bulk_transfer_survives_lossy_links() {
    let (world, _mb, client, server) = bulk(Some(6), 40_000);
    assert!(world.net.stats.dropped > 0);
    assert!(world.net.host(client).expect("client").tcp.stats.rexmit > 0);
    let ab = world.net.link(LinkId(0)).expect("link");
    assert_eq!(ab.dropped, ab.sent / 6);
    // 服务端重传的 FIN 仍落在客户端的 TIME_WAIT 内，被重新确认而不是 RST
    for host in [client, server] {
        assert_eq!(world.net.host(host).expect("host").tcp.stats.rst_sent, 0);
    }
}

#[test]
fn empty_transfer_still_closes_cleanly() {
    bulk(None, 0);
}

#[test]
fn request_messages_drive_the_stack() {
    let (mut world, client, server) = two_hosts(None);
    let mut mb = Mailbox::default();

    let server_rec = Recorder::default();
    let listened: Arc<Mutex<Option<Result<ConnId, TcpError>>>> = Arc::default();
    let l = listened.clone();
    mb.post(OpenListen {
        host: server,
        port: 7,
        callbacks: server_rec.callbacks(true, true),
        reply: Some(Box::new(move |r| *l.lock().expect("reply") = Some(r))),
    });

    let client_rec = Recorder::default();
    let opened: Arc<Mutex<Option<Result<ConnId, TcpError>>>> = Arc::default();
    let o = opened.clone();
    mb.post_at(
        LoopTime::from_millis(1),
        OpenActive {
            host: client,
            local_port: 0,
            remote: SocketAddrV4::new(SERVER, 7),
            callbacks: client_rec.callbacks(true, true),
            reply: Some(Box::new(move |r| *o.lock().expect("reply") = Some(r))),
        },
    );
    mb.run_until(LoopTime::from_millis(100), &mut world);

    assert!(matches!(*listened.lock().expect("reply"), Some(Ok(_))));
    let conn = (*opened.lock().expect("reply"))
        .expect("open answered")
        .expect("open succeeded");
    assert_eq!(client_rec.events(), vec![Ev::Connected(conn)]);
    let local = world
        .net
        .host(client)
        .and_then(|h| h.tcp.ccb(conn))
        .map(|c| c.local)
        .expect("client ccb");
    assert_eq!(*local.ip(), CLIENT);
    assert_eq!(local.port(), TcpConfig::default().ephemeral_port_base);

    mb.post(Write {
        host: client,
        conn,
        data: b"echo me".to_vec(),
        reply: None,
    });
    mb.post(Close {
        host: client,
        conn,
        reply: None,
    });
    mb.run_until(LoopTime::from_millis(500), &mut world);

    assert_eq!(server_rec.data(), b"echo me".to_vec());
    assert_eq!(server_rec.count(|e| *e == Ev::Fin), 1);
    assert_eq!(
        world.net.host(client).and_then(|h| h.tcp.state(conn)),
        Some(TcpState::FinWait2)
    );
}

#[test]
fn requests_for_unknown_hosts_or_routes_fail() {
    let (mut world, client, _server) = two_hosts(None);
    let mut mb = Mailbox::default();

    let results: Arc<Mutex<Vec<Result<ConnId, TcpError>>>> = Arc::default();
    let r1 = results.clone();
    mb.post(OpenListen {
        host: HostId(42),
        port: 80,
        callbacks: Default::default(),
        reply: Some(Box::new(move |r| r1.lock().expect("reply").push(r))),
    });
    let r2 = results.clone();
    mb.post(OpenActive {
        host: client,
        local_port: 0,
        remote: SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 1), 80),
        callbacks: Default::default(),
        reply: Some(Box::new(move |r| r2.lock().expect("reply").push(r))),
    });
    mb.run(&mut world);

    assert_eq!(
        *results.lock().expect("reply"),
        vec![Err(TcpError::UnknownConnection), Err(TcpError::NoRoute)]
    );
    assert_eq!(world.net.stats.datagrams, 0);
}

#[test]
fn segments_to_hosts_without_link_are_not_queued() {
    let mut world = NetWorld::default();
    let a = world.net.add_host("a", CLIENT, quick_cfg());
    let _b = world.net.add_host("b", SERVER, quick_cfg());
    let mut mb = Mailbox::default();

    // 没有链路：显式给出本地地址绕过路由查询，IP 出口拒绝非邻居
    let r = world.net.with_host(a, |tcp, ip| {
        tcp.open_active(
            SocketAddrV4::new(CLIENT, 0),
            SocketAddrV4::new(SERVER, 80),
            Default::default(),
            ip,
        )
    });
    assert!(matches!(r, Some(Ok(_))));
    world.net.flush(&mut mb);
    assert_eq!(world.net.stats.datagrams, 0);
    assert_eq!(world.net.host(a).expect("host").outbox.len(), 0);
}
