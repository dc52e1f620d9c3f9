//! 连接控制块（CCB）
//!
//! 每个连接或监听端点一个。CCB 独占它排队的所有报文段：
//! `unsent`（已排队未发送）、`unacked`（已发送待确认）、`ooseq`（乱序到达）。

use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddrV4;

use bitflags::bitflags;
use serde::Serialize;

use super::callbacks::Callbacks;
use super::config::TcpConfig;
use super::rtt::RttEstimator;
use super::segment::Segment;
use super::stats::TcpStats;
use crate::buf::PacketBuf;
use crate::net::IpLayer;
use crate::wire::SeqNum;

/// 连接句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnId(pub u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 连接状态。顺序有意义：`>= Established` 表示握手已完成。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TcpState {
    Closed,
    Listen,
    SynSent,
    SynRcvd,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
}

impl fmt::Display for TcpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TcpState::Closed => "CLOSED",
            TcpState::Listen => "LISTEN",
            TcpState::SynSent => "SYN_SENT",
            TcpState::SynRcvd => "SYN_RCVD",
            TcpState::Established => "ESTABLISHED",
            TcpState::FinWait1 => "FIN_WAIT_1",
            TcpState::FinWait2 => "FIN_WAIT_2",
            TcpState::CloseWait => "CLOSE_WAIT",
            TcpState::Closing => "CLOSING",
            TcpState::LastAck => "LAST_ACK",
            TcpState::TimeWait => "TIME_WAIT",
        };
        f.write_str(s)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CcbFlags: u8 {
        /// 有一个延迟 ACK 待发
        const ACK_DELAY = 0x01;
        /// 下次输出时立即发 ACK
        const ACK_NOW = 0x02;
        /// 处于快速恢复
        const INFR = 0x04;
        /// 收到可接受的 RST，等待拆除
        const RESET = 0x08;
        /// 已进入 CLOSED，等待释放
        const CLOSED = 0x10;
        /// 已按序收到对端 FIN
        const GOT_FIN = 0x20;
    }
}

/// 处理过程中借用的外部资源。
pub(crate) struct Ctx<'a> {
    pub ip: &'a mut dyn IpLayer,
    pub stats: &'a mut TcpStats,
    pub ticks: u32,
    /// 除本 CCB 外，全栈还剩多少报文段可用
    pub seg_room: usize,
}

#[derive(Debug)]
pub struct Ccb {
    pub id: ConnId,
    pub local: SocketAddrV4,
    pub remote: SocketAddrV4,
    pub state: TcpState,
    pub flags: CcbFlags,
    pub(crate) cfg: TcpConfig,

    // receiver
    pub rcv_nxt: SeqNum,
    pub rcv_wnd: u16,

    // timers
    /// 最近一次收到报文时的 tick
    pub tmr: u32,
    /// 自上次（重）传以来经过的 tick
    pub rtime: u16,

    pub mss: u16,

    // RTT
    pub rtt: RttEstimator,
    /// 正在计时的探测：(发送时 tick, 序列号)
    pub rtt_probe: Option<(u32, SeqNum)>,
    pub nrtx: u8,

    // fast retransmit / recovery
    pub lastack: SeqNum,
    pub dupacks: u8,

    // congestion control
    pub cwnd: u16,
    pub ssthresh: u16,

    // sender
    pub snd_nxt: SeqNum,
    pub snd_max: SeqNum,
    pub snd_wnd: u16,
    pub snd_wl1: SeqNum,
    pub snd_wl2: SeqNum,
    /// 下一个入队字节的序列号
    pub snd_lbb: SeqNum,
    pub snd_buf: u16,

    pub unsent: VecDeque<Segment>,
    pub unacked: VecDeque<Segment>,
    pub ooseq: VecDeque<Segment>,

    pub(crate) recv_data: Option<PacketBuf>,
    /// 本次输入确认的序列号单位数
    pub(crate) acked: u32,
    pub(crate) callbacks: Callbacks,
}

impl Ccb {
    pub fn new(id: ConnId, cfg: TcpConfig, iss: SeqNum, ticks: u32) -> Self {
        let unspecified = SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, 0);
        Self {
            id,
            local: unspecified,
            remote: unspecified,
            state: TcpState::Closed,
            flags: CcbFlags::empty(),
            rcv_nxt: SeqNum(0),
            rcv_wnd: cfg.wnd,
            tmr: ticks,
            rtime: 0,
            mss: cfg.mss,
            rtt: RttEstimator::new(cfg.initial_rto_ticks),
            rtt_probe: None,
            nrtx: 0,
            lastack: iss,
            dupacks: 0,
            cwnd: 1,
            ssthresh: 0,
            snd_nxt: iss,
            snd_max: iss,
            snd_wnd: 0,
            snd_wl1: SeqNum(0),
            snd_wl2: iss,
            snd_lbb: iss,
            snd_buf: cfg.snd_buf,
            unsent: VecDeque::new(),
            unacked: VecDeque::new(),
            ooseq: VecDeque::new(),
            recv_data: None,
            acked: 0,
            callbacks: Callbacks::default(),
            cfg,
        }
    }

    /// 发送队列上挂着的缓冲块数
    pub fn snd_queuelen(&self) -> usize {
        self.unsent
            .iter()
            .chain(self.unacked.iter())
            .map(Segment::buffers)
            .sum()
    }

    /// 本 CCB 占用的报文段数
    pub fn segment_count(&self) -> usize {
        self.unsent.len() + self.unacked.len() + self.ooseq.len()
    }

    pub fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }

    /// 延迟 ACK；已有一个在等待时升级为立即 ACK。
    pub(crate) fn ack_delayed(&mut self) {
        if self.flags.contains(CcbFlags::ACK_DELAY) {
            self.flags.insert(CcbFlags::ACK_NOW);
        } else {
            self.flags.insert(CcbFlags::ACK_DELAY);
        }
    }

    pub(crate) fn ack_now(&mut self) {
        self.flags.insert(CcbFlags::ACK_NOW);
    }

    /// 释放全部排队的报文段。
    pub(crate) fn purge(&mut self) {
        if self.state == TcpState::Listen {
            return;
        }
        if !self.unacked.is_empty() || !self.unsent.is_empty() || !self.ooseq.is_empty() {
            tracing::trace!(conn = %self.id, "purging queued segments");
        }
        self.unsent.clear();
        self.unacked.clear();
        self.ooseq.clear();
    }

    /// 应用消费了 `len` 字节：重新打开接收窗口并安排一个 ACK 通告新窗口。
    pub(crate) fn recved(&mut self, len: usize) {
        let grown = (self.rcv_wnd as usize).saturating_add(len);
        self.rcv_wnd = grown.min(self.cfg.wnd as usize) as u16;
        if !self.flags.intersects(CcbFlags::ACK_DELAY | CcbFlags::ACK_NOW) {
            self.ack_delayed();
        }
    }

    /// 检查队列与序列号之间的不变式。
    pub fn check_invariants(&self) -> Result<(), String> {
        let id = self.id;
        if self.snd_buf > self.cfg.snd_buf {
            return Err(format!("{id}: snd_buf {} above limit", self.snd_buf));
        }
        if self.rcv_wnd > self.cfg.wnd {
            return Err(format!("{id}: rcv_wnd {} above limit", self.rcv_wnd));
        }
        if (self.snd_queuelen() == 0) != (self.unsent.is_empty() && self.unacked.is_empty()) {
            return Err(format!("{id}: queue length disagrees with queues"));
        }

        let mut prev: Option<&Segment> = None;
        for s in self.unacked.iter().chain(self.unsent.iter()) {
            if let Some(p) = prev {
                if !p.seq().lt(s.seq()) || p.end().gt(s.seq()) {
                    return Err(format!("{id}: send queue out of order at {}", s.seq()));
                }
            }
            prev = Some(s);
        }
        if let Some(head) = self.unacked.front() {
            if !head.end().gt(self.lastack) {
                return Err(format!("{id}: fully acked segment {} still queued", head.seq()));
            }
        }
        if let Some(last) = self.unacked.back() {
            if last.end().gt(self.snd_max) {
                return Err(format!("{id}: unacked segment beyond snd_max"));
            }
        }

        let mut prev: Option<&Segment> = None;
        for s in &self.ooseq {
            if !s.seq().gt(self.rcv_nxt) {
                return Err(format!("{id}: ooseq segment {} not beyond rcv_nxt", s.seq()));
            }
            if let Some(p) = prev {
                if !p.seq().lt(s.seq()) || p.end().gt(s.seq()) {
                    return Err(format!("{id}: ooseq overlap at {}", s.seq()));
                }
            }
            prev = Some(s);
        }

        if !matches!(self.state, TcpState::Listen | TcpState::Closed | TcpState::TimeWait) {
            if self.snd_max.lt(self.lastack) {
                return Err(format!("{id}: lastack beyond snd_max"));
            }
            if self.snd_max.lt(self.snd_nxt) {
                return Err(format!("{id}: snd_max behind snd_nxt"));
            }
            if self.snd_lbb.lt(self.snd_max) {
                return Err(format!("{id}: snd_lbb behind snd_max"));
            }
        }
        Ok(())
    }
}
