//! 输入路径：解码、分用、状态机，以及处理结束后的回调分发与输出。

use std::net::{Ipv4Addr, SocketAddrV4};

use tracing::{debug, info, trace, warn};

use super::ccb::{CcbFlags, Ccb, Ctx, TcpState};
use super::error::TcpError;
use super::output::send_reset;
use super::segment::Segment;
use super::stack::TcpStack;
use super::table::Slot;
use crate::buf::PacketBuf;
use crate::net::IpLayer;
use crate::wire::{
    checksum_pseudo, mss_option, Ipv4Packet, SeqNum, TcpFlags, TcpHeader, WireError, IP_PROTO_TCP,
};

/// 一个已解码的入站报文段及其 IP 地址。
#[derive(Debug, Clone)]
pub struct Incoming {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub seg: Segment,
}

impl Incoming {
    /// 本端视角的四元组：(local, remote)
    pub fn endpoints(&self) -> (SocketAddrV4, SocketAddrV4) {
        (
            SocketAddrV4::new(self.dst, self.seg.hdr.dst_port),
            SocketAddrV4::new(self.src, self.seg.hdr.src_port),
        )
    }
}

/// 状态机处理完一个报文段之后 CCB 的去向。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Keep,
    /// 刚进入 TIME-WAIT，需要移到 TIME-WAIT 列表
    TimeWait,
    /// 接受了 RST
    Reset,
    /// LAST-ACK 收到确认，直接释放
    Closed,
    /// 需要中止（发 RST 并报告 Aborted）
    Abort,
}

impl Ccb {
    /// 对一个非 LISTEN 的 CCB 执行一次状态机。
    pub(crate) fn process(&mut self, inc: &mut Incoming, ctx: &mut Ctx<'_>) -> Disposition {
        let flags = inc.seg.flags();
        let seqno = inc.seg.seq();
        let ackno = inc.seg.hdr.ack;

        if flags.contains(TcpFlags::RST) {
            let acceptable = match self.state {
                TcpState::Listen => false,
                TcpState::SynSent => ackno == self.snd_nxt,
                _ => seqno.geq(self.rcv_nxt) && seqno.leq(self.rcv_nxt + self.rcv_wnd as u32),
            };
            if acceptable {
                info!(conn = %self.id, state = ?self.state, "connection reset by peer");
                self.flags.insert(CcbFlags::RESET);
                self.flags.remove(CcbFlags::ACK_DELAY);
                return Disposition::Reset;
            }
            debug!(conn = %self.id, seq = %seqno, rcv_nxt = %self.rcv_nxt, "unacceptable reset ignored");
            return Disposition::Keep;
        }

        self.tmr = ctx.ticks;

        match self.state {
            TcpState::Closed | TcpState::Listen => {}
            TcpState::SynSent => {
                let syn_acked = self
                    .unacked
                    .front()
                    .is_some_and(|s| s.flags().contains(TcpFlags::SYN) && ackno == s.seq() + 1);
                if flags.contains(TcpFlags::ACK | TcpFlags::SYN) && syn_acked {
                    self.rcv_nxt = seqno + 1;
                    self.lastack = ackno;
                    self.snd_wnd = inc.seg.hdr.wnd;
                    self.snd_wl1 = seqno;
                    self.snd_wl2 = ackno;
                    self.state = TcpState::Established;
                    self.cwnd = self.mss;
                    self.unacked.pop_front();
                    self.snd_buf = self.snd_buf.saturating_add(1).min(self.cfg.snd_buf);
                    self.nrtx = 0;
                    self.rtime = 0;
                    if let Some((sent_at, rtseq)) = self.rtt_probe.take() {
                        if rtseq.lt(ackno) {
                            self.rtt.sample(ctx.ticks.wrapping_sub(sent_at) as i16);
                        }
                    }
                    if let Some(m) = inc.seg.hdr.mss().filter(|m| *m > 0) {
                        self.mss = m.min(self.cfg.mss);
                    }
                    info!(conn = %self.id, local = %self.local, remote = %self.remote, mss = self.mss, "connection established");
                    if let Some(f) = self.callbacks.connected.clone() {
                        f(self.id);
                    }
                    self.ack_now();
                }
            }
            TcpState::SynRcvd => {
                if flags.contains(TcpFlags::ACK)
                    && self.lastack.lt(ackno)
                    && ackno.leq(self.snd_nxt)
                {
                    self.state = TcpState::Established;
                    info!(conn = %self.id, local = %self.local, remote = %self.remote, "connection accepted");
                    let accepted = self.callbacks.accept.clone().is_some_and(|f| f(self.id));
                    if !accepted {
                        debug!(conn = %self.id, "accept rejected or missing, aborting");
                        return Disposition::Abort;
                    }
                    self.receive(&mut inc.seg, ctx);
                    self.cwnd = self.mss;
                    if self.flags.contains(CcbFlags::GOT_FIN) {
                        self.ack_now();
                        self.state = TcpState::CloseWait;
                    }
                }
            }
            TcpState::Established | TcpState::CloseWait => {
                self.receive(&mut inc.seg, ctx);
                if self.flags.contains(CcbFlags::GOT_FIN) {
                    self.ack_now();
                    if self.state == TcpState::Established {
                        debug!(conn = %self.id, "peer closed, entering CLOSE_WAIT");
                        self.state = TcpState::CloseWait;
                    }
                }
            }
            TcpState::FinWait1 => {
                self.receive(&mut inc.seg, ctx);
                let fin_acked = flags.contains(TcpFlags::ACK) && self.our_fin_acked(ackno);
                if self.flags.contains(CcbFlags::GOT_FIN) {
                    self.ack_now();
                    if fin_acked {
                        return self.enter_time_wait();
                    }
                    debug!(conn = %self.id, "simultaneous close, entering CLOSING");
                    self.state = TcpState::Closing;
                } else if fin_acked {
                    debug!(conn = %self.id, "FIN acked, entering FIN_WAIT_2");
                    self.state = TcpState::FinWait2;
                }
            }
            TcpState::FinWait2 => {
                self.receive(&mut inc.seg, ctx);
                if self.flags.contains(CcbFlags::GOT_FIN) {
                    self.ack_now();
                    return self.enter_time_wait();
                }
            }
            TcpState::Closing => {
                self.receive(&mut inc.seg, ctx);
                if flags.contains(TcpFlags::ACK) && self.our_fin_acked(ackno) {
                    self.ack_now();
                    return self.enter_time_wait();
                }
            }
            TcpState::LastAck => {
                self.receive(&mut inc.seg, ctx);
                if flags.contains(TcpFlags::ACK) && self.our_fin_acked(ackno) {
                    info!(conn = %self.id, "connection closed");
                    self.state = TcpState::Closed;
                    self.flags.insert(CcbFlags::CLOSED);
                    return Disposition::Closed;
                }
            }
            TcpState::TimeWait => {
                let end = inc.seg.end();
                if end.gt(self.rcv_nxt) {
                    self.rcv_nxt = end;
                }
                if inc.seg.tcp_len() > 0 {
                    self.ack_now();
                }
            }
        }
        Disposition::Keep
    }

    /// 我方 FIN 已发出并被确认
    fn our_fin_acked(&self, ackno: SeqNum) -> bool {
        ackno == self.snd_nxt && self.unsent.is_empty()
    }

    fn enter_time_wait(&mut self) -> Disposition {
        info!(conn = %self.id, local = %self.local, remote = %self.remote, "connection closed, entering TIME_WAIT");
        self.purge();
        self.state = TcpState::TimeWait;
        Disposition::TimeWait
    }
}

impl TcpStack {
    /// 交付一个完整的 IPv4 数据报。
    pub fn deliver_datagram(&mut self, bytes: &[u8], ip: &mut dyn IpLayer) -> Result<(), WireError> {
        let pkt = match Ipv4Packet::parse(bytes) {
            Ok(p) => p,
            Err(e) => {
                self.stats.dropped += 1;
                return Err(e);
            }
        };
        if pkt.proto != IP_PROTO_TCP {
            return Err(WireError::NotTcp);
        }
        self.input(pkt.src, pkt.dst, pkt.payload, ip)
    }

    /// 交付一个 TCP 报文段（从 IP 载荷开始）。
    #[tracing::instrument(skip(self, bytes, ip), fields(src = %src, dst = %dst, len = bytes.len()))]
    pub fn input(
        &mut self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        bytes: &[u8],
        ip: &mut dyn IpLayer,
    ) -> Result<(), WireError> {
        if dst.is_broadcast() || dst.is_multicast() {
            trace!("dropping segment to broadcast/multicast address");
            return Ok(());
        }
        if checksum_pseudo([bytes], src, dst, IP_PROTO_TCP) != 0 {
            self.stats.dropped += 1;
            debug!("dropping segment with bad checksum");
            return Err(WireError::BadChecksum);
        }
        let (hdr, off) = match TcpHeader::parse(bytes) {
            Ok(v) => v,
            Err(e) => {
                self.stats.dropped += 1;
                return Err(e);
            }
        };
        let mut inc = Incoming {
            src,
            dst,
            seg: Segment::new(hdr, PacketBuf::copy_from_slice(&bytes[off..])),
        };
        trace!(
            seq = %inc.seg.seq(),
            ack = %inc.seg.hdr.ack,
            flags = ?inc.seg.flags(),
            len = inc.seg.len(),
            wnd = inc.seg.hdr.wnd,
            "segment received"
        );

        let (local, remote) = inc.endpoints();
        let Some(slot) = self.table.find(local, remote) else {
            if !inc.seg.flags().contains(TcpFlags::RST) {
                debug!(local = %local, remote = %remote, "no matching connection, sending RST");
                send_reset(
                    ip,
                    &mut self.stats,
                    inc.seg.hdr.ack,
                    inc.seg.seq() + inc.seg.tcp_len(),
                    local,
                    remote,
                );
            }
            return Ok(());
        };

        if slot == Slot::Listen {
            self.listen_input(&inc, ip);
            return Ok(());
        }

        let Some(mut ccb) = self.table.take(slot) else {
            return Ok(());
        };
        ccb.recv_data = None;
        ccb.acked = 0;
        let room = self.seg_room();
        let mut ctx = Self::ctx(ip, &mut self.stats, self.ticks, room);
        let disposition = ccb.process(&mut inc, &mut ctx);
        self.finish_input(ccb, slot, disposition, ip);
        Ok(())
    }

    /// 状态机之后：拆除，或分发回调、输出并放回连接表。
    fn finish_input(&mut self, mut ccb: Ccb, slot: Slot, disposition: Disposition, ip: &mut dyn IpLayer) {
        match disposition {
            Disposition::Reset => {
                ccb.callbacks.notify_err(ccb.id, TcpError::ConnectionReset);
            }
            Disposition::Closed => {
                trace!(conn = %ccb.id, "releasing closed connection");
            }
            Disposition::Abort => {
                send_reset(ip, &mut self.stats, ccb.snd_nxt, ccb.rcv_nxt, ccb.local, ccb.remote);
                ccb.callbacks.notify_err(ccb.id, TcpError::Aborted);
            }
            Disposition::Keep | Disposition::TimeWait => {
                self.deliver_to_app(&mut ccb);
                let room = self.seg_room();
                let mut ctx = Self::ctx(ip, &mut self.stats, self.ticks, room);
                if let Err(e) = ccb.output(&mut ctx) {
                    warn!(conn = %ccb.id, error = %e, "output after input failed");
                }
                if disposition == Disposition::TimeWait {
                    self.table.register(ccb);
                } else {
                    self.table.restore(slot, ccb);
                }
            }
        }
    }

    /// 依次通知 sent、按序数据、对端 FIN。
    fn deliver_to_app(&mut self, ccb: &mut Ccb) {
        let id = ccb.id;
        if ccb.acked > 0 {
            if let Some(f) = ccb.callbacks.sent.clone() {
                f(id, ccb.acked);
            }
        }
        if let Some(data) = ccb.recv_data.take() {
            match ccb.callbacks.recv.clone() {
                Some(f) => {
                    let consumed = f(id, Some(data));
                    if consumed > 0 {
                        ccb.recved(consumed);
                    }
                }
                None => {
                    let len = data.len();
                    trace!(conn = %id, len, "no recv handler, discarding data");
                    ccb.recved(len);
                }
            }
        }
        if ccb.flags.contains(CcbFlags::GOT_FIN) {
            ccb.flags.remove(CcbFlags::GOT_FIN);
            match ccb.callbacks.recv.clone() {
                Some(f) => {
                    f(id, None);
                }
                None => {
                    let room = self.seg_room();
                    if let Err(e) = ccb.shutdown(room) {
                        debug!(conn = %id, error = %e, "close after FIN failed");
                    }
                }
            }
        }
    }

    /// 监听端点收到报文：ACK 回 RST，SYN 派生一个 SYN_RCVD 的新连接。
    fn listen_input(&mut self, inc: &Incoming, ip: &mut dyn IpLayer) {
        let flags = inc.seg.flags();
        if flags.contains(TcpFlags::RST) {
            return;
        }
        let (local, remote) = inc.endpoints();
        if flags.contains(TcpFlags::ACK) {
            debug!(local = %local, remote = %remote, "ACK in LISTEN, sending RST");
            send_reset(
                ip,
                &mut self.stats,
                inc.seg.hdr.ack,
                inc.seg.seq() + inc.seg.tcp_len(),
                local,
                remote,
            );
            return;
        }
        if !flags.contains(TcpFlags::SYN) {
            return;
        }
        let Some(listener) = self.table.slot(Slot::Listen) else {
            return;
        };
        let callbacks = listener.callbacks.clone();
        let listen_port = listener.local.port();

        // 分配失败时什么也不做，等对端重传 SYN
        let Ok(mut npcb) = self.alloc_ccb() else {
            return;
        };
        npcb.local = SocketAddrV4::new(inc.dst, listen_port);
        npcb.remote = remote;
        npcb.state = TcpState::SynRcvd;
        npcb.rcv_nxt = inc.seg.seq() + 1;
        npcb.snd_wnd = inc.seg.hdr.wnd;
        npcb.ssthresh = npcb.snd_wnd;
        npcb.snd_wl1 = inc.seg.seq();
        npcb.callbacks = callbacks;
        if let Some(m) = inc.seg.hdr.mss().filter(|m| *m > 0) {
            npcb.mss = m.min(self.cfg.mss);
        }
        info!(conn = %npcb.id, local = %npcb.local, remote = %npcb.remote, "connection request");

        let room = self.seg_room();
        let opts = mss_option(npcb.mss);
        if let Err(e) = npcb.enqueue(PacketBuf::new(), TcpFlags::SYN | TcpFlags::ACK, opts, room) {
            self.stats.memerr += 1;
            debug!(conn = %npcb.id, error = %e, "could not queue SYN|ACK");
            return;
        }
        let mut ctx = Self::ctx(ip, &mut self.stats, self.ticks, room);
        if let Err(e) = npcb.output(&mut ctx) {
            warn!(conn = %npcb.id, error = %e, "SYN|ACK output failed");
        }
        self.table.register(npcb);
    }
}
