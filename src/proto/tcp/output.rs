//! 发送引擎：入队分段、窗口内发送、重传、无状态 RST。

use std::net::SocketAddrV4;

use tracing::{debug, trace, warn};

use super::ccb::{CcbFlags, Ccb, Ctx, TcpState};
use super::error::TcpError;
use super::segment::Segment;
use super::stats::TcpStats;
use crate::buf::PacketBuf;
use crate::net::IpLayer;
use crate::wire::{SeqNum, TcpFlags, TcpHeader, IP_PROTO_TCP};

impl Ccb {
    /// 把 `data` 切成不超过 MSS 的报文段挂到 `unsent` 尾部。
    ///
    /// `options` 只出现在不带数据的控制段（SYN / SYN|ACK）上。
    pub(crate) fn enqueue(
        &mut self,
        mut data: PacketBuf,
        flags: TcpFlags,
        options: Vec<u8>,
        seg_room: usize,
    ) -> Result<(), TcpError> {
        let len = data.len();
        // 选项区最多 40 字节
        if options.len() > 40 {
            return Err(TcpError::BufferError);
        }
        if len > self.snd_buf as usize {
            debug!(conn = %self.id, len, snd_buf = self.snd_buf, "enqueue: too much data");
            return Err(TcpError::OutOfMemory);
        }

        let mut queuelen = self.snd_queuelen();
        let max_queuelen = self.cfg.snd_queuelen_limit();
        if queuelen >= max_queuelen {
            debug!(conn = %self.id, queuelen, max = max_queuelen, "enqueue: queue too long");
            return Err(TcpError::OutOfMemory);
        }

        let mss = self.mss.max(1) as usize;
        let mut seqno = self.snd_lbb;
        let mut queue: Vec<Segment> = Vec::new();
        while queue.is_empty() || !data.is_empty() {
            let chunk = data.split_to(mss);
            let hdr = TcpHeader {
                src_port: self.local.port(),
                dst_port: self.remote.port(),
                seq: seqno,
                flags,
                options: if queue.is_empty() { options.clone() } else { Vec::new() },
                ..TcpHeader::default()
            };
            let seg = Segment::new(hdr, chunk);
            queuelen += seg.buffers();
            if queuelen > max_queuelen {
                debug!(conn = %self.id, queuelen, "enqueue: queue too long");
                return Err(TcpError::OutOfMemory);
            }
            trace!(conn = %self.id, seq = %seg.seq(), end = %seg.end(), flags = ?flags, "enqueue: queueing");
            seqno += seg.len();
            queue.push(seg);
        }

        if self.segment_count() + queue.len() > seg_room {
            debug!(conn = %self.id, want = queue.len(), "enqueue: no segment memory");
            return Err(TcpError::OutOfMemory);
        }

        // 尾段还有空间就直接拼进去
        let ctl = TcpFlags::SYN | TcpFlags::FIN;
        let mut pushed_last = true;
        if let Some(tail) = self.unsent.back_mut() {
            let first_len = queue[0].len();
            if tail.tcp_len() != 0
                && !tail.flags().intersects(ctl)
                && !flags.intersects(ctl)
                && tail.len() + first_len <= mss as u32
            {
                let first = queue.remove(0);
                tail.data.append(first.data);
                trace!(conn = %self.id, new_len = tail.len(), "enqueue: chaining onto unsent tail");
                if queue.is_empty() {
                    pushed_last = false;
                }
            }
        }
        self.unsent.extend(queue);

        let consumed = len as u32 + flags.intersects(ctl) as u32;
        self.snd_lbb += consumed;
        self.snd_buf = self.snd_buf.saturating_sub(consumed.min(u16::MAX as u32) as u16);

        if pushed_last {
            if let Some(last) = self.unsent.back_mut() {
                if !last.is_empty() {
                    last.hdr.flags.insert(TcpFlags::PSH);
                }
            }
        }
        Ok(())
    }

    /// 未绑定本地地址时向 IP 层查询路由。
    fn bind_local_addr(&mut self, ctx: &mut Ctx<'_>) -> Result<(), TcpError> {
        if !self.local.ip().is_unspecified() {
            return Ok(());
        }
        match ctx.ip.route(*self.remote.ip()) {
            Some(addr) => {
                self.local.set_ip(addr);
                Ok(())
            }
            None => {
                warn!(conn = %self.id, remote = %self.remote, "no route to remote host");
                Err(TcpError::NoRoute)
            }
        }
    }

    fn head_fits(&self, wnd: u32) -> bool {
        self.unsent
            .front()
            .is_some_and(|s| s.seq().offset_from(self.lastack) + s.len() <= wnd)
    }

    /// 发送窗口允许的全部排队段；需要时先发一个纯 ACK。
    pub(crate) fn output(&mut self, ctx: &mut Ctx<'_>) -> Result<(), TcpError> {
        let wnd = self.snd_wnd.min(self.cwnd) as u32;

        if self.flags.contains(CcbFlags::ACK_NOW) && !self.head_fits(wnd) {
            self.flags.remove(CcbFlags::ACK_DELAY | CcbFlags::ACK_NOW);
            self.send_empty_ack(ctx)?;
        }

        while self.head_fits(wnd) {
            self.bind_local_addr(ctx)?;
            let Some(mut seg) = self.unsent.pop_front() else {
                break;
            };
            self.rtime = 0;
            if self.state != TcpState::SynSent {
                seg.hdr.flags.insert(TcpFlags::ACK);
                self.flags.remove(CcbFlags::ACK_DELAY | CcbFlags::ACK_NOW);
            }
            self.output_segment(&mut seg, ctx);
            self.snd_nxt = seg.end();
            self.snd_max = self.snd_max.max_seq(self.snd_nxt);
            if seg.tcp_len() > 0 {
                self.unacked.push_back(seg);
            }
        }
        Ok(())
    }

    fn output_segment(&mut self, seg: &mut Segment, ctx: &mut Ctx<'_>) {
        seg.hdr.ack = self.rcv_nxt;
        // silly window avoidance
        seg.hdr.wnd = if self.rcv_wnd < self.mss { 0 } else { self.rcv_wnd };
        self.rtime = 0;
        if self.rtt_probe.is_none() {
            self.rtt_probe = Some((ctx.ticks, seg.seq()));
        }
        trace!(conn = %self.id, seq = %seg.seq(), end = %seg.end(), ack = %seg.hdr.ack, "output segment");
        seg.fill_checksum(*self.local.ip(), *self.remote.ip());
        transmit(ctx.ip, ctx.stats, seg.to_wire(), self.local, self.remote);
    }

    fn send_empty_ack(&mut self, ctx: &mut Ctx<'_>) -> Result<(), TcpError> {
        self.bind_local_addr(ctx)?;
        let mut seg = Segment::new(
            TcpHeader {
                src_port: self.local.port(),
                dst_port: self.remote.port(),
                seq: self.snd_nxt,
                ack: self.rcv_nxt,
                flags: TcpFlags::ACK,
                wnd: self.rcv_wnd,
                ..TcpHeader::default()
            },
            PacketBuf::new(),
        );
        trace!(conn = %self.id, ack = %self.rcv_nxt, wnd = self.rcv_wnd, "sending bare ACK");
        seg.fill_checksum(*self.local.ip(), *self.remote.ip());
        transmit(ctx.ip, ctx.stats, seg.to_wire(), self.local, self.remote);
        Ok(())
    }

    /// 重传 `unacked` 队首，前提是它仍在当前窗口内。
    pub(crate) fn rexmit_head(&mut self, ctx: &mut Ctx<'_>) -> bool {
        let wnd = self.snd_wnd.min(self.cwnd) as u32;
        let Some(seg) = self.unacked.front_mut() else {
            return false;
        };
        // 部分确认过的段从 lastack 起算
        let off = if seg.seq().lt(self.lastack) {
            0
        } else {
            seg.seq().offset_from(self.lastack)
        };
        if off + seg.len() > wnd {
            debug!(conn = %self.id, wnd, seq = %seg.seq(), lastack = %self.lastack, "rexmit: segment outside window");
            return false;
        }
        self.nrtx = self.nrtx.saturating_add(1);
        seg.hdr.ack = self.rcv_nxt;
        seg.hdr.wnd = self.rcv_wnd;
        seg.fill_checksum(*self.local.ip(), *self.remote.ip());
        debug!(conn = %self.id, seq = %seg.seq(), end = %seg.end(), nrtx = self.nrtx, "retransmitting");
        transmit(ctx.ip, ctx.stats, seg.to_wire(), self.local, self.remote);
        ctx.stats.rexmit += 1;
        self.rtime = 0;
        // Karn: no RTT sample from retransmitted data
        self.rtt_probe = None;
        true
    }
}

fn transmit(
    ip: &mut dyn IpLayer,
    stats: &mut TcpStats,
    p: PacketBuf,
    local: SocketAddrV4,
    remote: SocketAddrV4,
) {
    stats.xmit += 1;
    if let Err(e) = ip.ip_output(p, *local.ip(), *remote.ip(), IP_PROTO_TCP) {
        debug!(error = %e, remote = %remote, "ip_output failed");
    }
}

/// 不依附任何 CCB 的 RST|ACK，窗口为 0。
pub fn send_reset(
    ip: &mut dyn IpLayer,
    stats: &mut TcpStats,
    seq: SeqNum,
    ack: SeqNum,
    local: SocketAddrV4,
    remote: SocketAddrV4,
) {
    let mut seg = Segment::new(
        TcpHeader {
            src_port: local.port(),
            dst_port: remote.port(),
            seq,
            ack,
            flags: TcpFlags::RST | TcpFlags::ACK,
            wnd: 0,
            ..TcpHeader::default()
        },
        PacketBuf::new(),
    );
    seg.fill_checksum(*local.ip(), *remote.ip());
    debug!(seq = %seq, ack = %ack, local = %local, remote = %remote, "sending RST");
    stats.rst_sent += 1;
    transmit(ip, stats, seg.to_wire(), local, remote);
}
