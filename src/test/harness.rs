//! 测试用的脚本化对端与双栈泵。

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex};

use crate::buf::PacketBuf;
use crate::net::{IpError, IpLayer};
use crate::proto::tcp::{Callbacks, ConnId, TcpConfig, TcpError, TcpStack, TcpState};
use crate::wire::{mss_option, SeqNum, TcpFlags, TcpHeader};

pub(crate) const A: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub(crate) const B: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

/// 本端默认 ISS（`iss_seed`，ticks 为 0 时不变）
pub(crate) const ISS: u32 = 6510;
/// 脚本化对端的 ISS
pub(crate) const PEER_ISS: u32 = 9000;

pub(crate) fn a(port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(A, port)
}

pub(crate) fn b(port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(B, port)
}

/// 一个发出的报文段
#[derive(Debug, Clone)]
pub(crate) struct Sent {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub hdr: TcpHeader,
    pub payload: Vec<u8>,
    pub bytes: Vec<u8>,
}

impl Sent {
    pub fn flags(&self) -> TcpFlags {
        self.hdr.flags
    }
}

/// 记录所有 `ip_output` 的 IP 层
pub(crate) struct Wire {
    pub local: Ipv4Addr,
    pub sent: Vec<Sent>,
    pub fail: bool,
}

impl Wire {
    pub fn new(local: Ipv4Addr) -> Self {
        Self {
            local,
            sent: Vec::new(),
            fail: false,
        }
    }

    pub fn take(&mut self) -> Vec<Sent> {
        std::mem::take(&mut self.sent)
    }
}

impl IpLayer for Wire {
    fn ip_output(
        &mut self,
        seg: PacketBuf,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        _proto: u8,
    ) -> Result<(), IpError> {
        if self.fail {
            return Err(IpError::Unreachable(dst));
        }
        let bytes = seg.to_vec();
        let (hdr, off) = TcpHeader::parse(&bytes).expect("stack emitted a malformed header");
        self.sent.push(Sent {
            src,
            dst,
            hdr,
            payload: bytes[off..].to_vec(),
            bytes,
        });
        Ok(())
    }

    fn route(&self, _dst: Ipv4Addr) -> Option<Ipv4Addr> {
        Some(self.local)
    }
}

/// 构造一个校验和正确的 TCP 报文段
pub(crate) fn segment(
    from: SocketAddrV4,
    to: SocketAddrV4,
    seq: u32,
    ack: u32,
    flags: TcpFlags,
    wnd: u16,
    payload: &[u8],
) -> Vec<u8> {
    segment_with_options(from, to, seq, ack, flags, wnd, Vec::new(), payload)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn segment_with_options(
    from: SocketAddrV4,
    to: SocketAddrV4,
    seq: u32,
    ack: u32,
    flags: TcpFlags,
    wnd: u16,
    options: Vec<u8>,
    payload: &[u8],
) -> Vec<u8> {
    let mut hdr = TcpHeader {
        src_port: from.port(),
        dst_port: to.port(),
        seq: SeqNum(seq),
        ack: SeqNum(ack),
        flags,
        wnd,
        options,
        ..TcpHeader::default()
    };
    hdr.fill_checksum([payload], *from.ip(), *to.ip());
    let mut out = hdr.to_bytes();
    out.extend_from_slice(payload);
    out
}

/// 回调事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Ev {
    Accept(ConnId),
    Connected(ConnId),
    Data(Vec<u8>),
    Fin,
    Sent(u32),
    Err(TcpError),
}

/// 把回调记成事件列表
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    events: Arc<Mutex<Vec<Ev>>>,
}

impl Recorder {
    /// `accept` 决定被动连接是否接受；`consume` 决定 recv 是否立即消费数据。
    pub fn callbacks(&self, accept: bool, consume: bool) -> Callbacks {
        let (e1, e2, e3, e4, e5) = (
            self.events.clone(),
            self.events.clone(),
            self.events.clone(),
            self.events.clone(),
            self.events.clone(),
        );
        Callbacks::default()
            .on_accept(move |id| {
                e1.lock().expect("events lock").push(Ev::Accept(id));
                accept
            })
            .on_connected(move |id| e2.lock().expect("events lock").push(Ev::Connected(id)))
            .on_recv(move |_, data| {
                let mut ev = e3.lock().expect("events lock");
                match data {
                    Some(d) => {
                        let bytes = d.to_vec();
                        let n = bytes.len();
                        ev.push(Ev::Data(bytes));
                        if consume { n } else { 0 }
                    }
                    None => {
                        ev.push(Ev::Fin);
                        0
                    }
                }
            })
            .on_sent(move |_, n| e4.lock().expect("events lock").push(Ev::Sent(n)))
            .on_err(move |_, e| e5.lock().expect("events lock").push(Ev::Err(e)))
    }

    pub fn events(&self) -> Vec<Ev> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn clear(&self) {
        self.events.lock().expect("events lock").clear();
    }

    /// 收到的全部数据，按到达顺序拼接
    pub fn data(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Ev::Data(d) => Some(d),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Ev) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

/// 本端 A:1000 主动连到脚本化对端 B:80，已完成握手。
pub(crate) struct Scripted {
    pub stack: TcpStack,
    pub wire: Wire,
    pub id: ConnId,
    pub rec: Recorder,
}

impl Scripted {
    /// 以对端通告的 `peer_mss` 与窗口 `peer_wnd` 完成握手。
    pub fn established(cfg: TcpConfig, peer_mss: u16, peer_wnd: u16) -> Self {
        let mut stack = TcpStack::new(cfg);
        let mut wire = Wire::new(A);
        let rec = Recorder::default();
        let id = stack
            .open_active(a(1000), b(80), rec.callbacks(true, true), &mut wire)
            .expect("open_active");
        let syn = wire.take();
        assert_eq!(syn.len(), 1);
        let synack = segment_with_options(
            b(80),
            a(1000),
            PEER_ISS,
            syn[0].hdr.seq.0.wrapping_add(1),
            TcpFlags::SYN | TcpFlags::ACK,
            peer_wnd,
            mss_option(peer_mss),
            &[],
        );
        stack.input(B, A, &synack, &mut wire).expect("input SYN|ACK");
        assert_eq!(stack.state(id), Some(TcpState::Established));
        wire.take();
        rec.clear();
        Self {
            stack,
            wire,
            id,
            rec,
        }
    }

    /// 对端发来一个报文段
    pub fn deliver(&mut self, seq: u32, ack: u32, flags: TcpFlags, wnd: u16, payload: &[u8]) {
        let bytes = segment(b(80), a(1000), seq, ack, flags, wnd, payload);
        self.stack
            .input(B, A, &bytes, &mut self.wire)
            .expect("input");
        self.stack.check_invariants().expect("invariants");
    }

    /// 对端纯 ACK（序号取当前 rcv_nxt）
    pub fn ack(&mut self, ack: u32, wnd: u16) {
        let seq = self.rcv_nxt();
        self.deliver(seq, ack, TcpFlags::ACK, wnd, &[]);
    }

    pub fn rcv_nxt(&self) -> u32 {
        self.stack.ccb(self.id).expect("ccb").rcv_nxt.0
    }

    pub fn tick(&mut self, n: usize) {
        for _ in 0..n {
            self.stack.tmr(&mut self.wire);
            self.stack.check_invariants().expect("invariants");
        }
    }
}

/// 两个真实协议栈，经由可丢包的"线路"互相投递。
pub(crate) struct Pair {
    pub a: TcpStack,
    pub wa: Wire,
    pub b: TcpStack,
    pub wb: Wire,
    /// 每第 N 个报文段丢弃一个
    pub drop_every: Option<usize>,
    carried: usize,
}

impl Pair {
    pub fn new(cfg: TcpConfig) -> Self {
        Self {
            a: TcpStack::new(cfg.clone()),
            wa: Wire::new(A),
            b: TcpStack::new(cfg),
            wb: Wire::new(B),
            drop_every: None,
            carried: 0,
        }
    }

    fn lose(&mut self) -> bool {
        self.carried += 1;
        self.drop_every.is_some_and(|n| self.carried % n == 0)
    }

    /// 投递所有在途报文段直到两边都安静；返回投递数。
    pub fn pump(&mut self) -> usize {
        let mut n = 0;
        loop {
            let from_a = self.wa.take();
            let from_b = self.wb.take();
            if from_a.is_empty() && from_b.is_empty() {
                return n;
            }
            for s in from_a {
                if self.lose() {
                    continue;
                }
                self.b.input(s.src, s.dst, &s.bytes, &mut self.wb).expect("input at b");
                n += 1;
            }
            for s in from_b {
                if self.lose() {
                    continue;
                }
                self.a.input(s.src, s.dst, &s.bytes, &mut self.wa).expect("input at a");
                n += 1;
            }
            self.a.check_invariants().expect("invariants at a");
            self.b.check_invariants().expect("invariants at b");
        }
    }

    pub fn tick(&mut self) {
        self.a.tmr(&mut self.wa);
        self.b.tmr(&mut self.wb);
    }
}
