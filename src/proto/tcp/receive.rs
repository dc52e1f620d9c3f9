//! 接收处理：ACK / 窗口 / 拥塞控制记账，以及按序 / 乱序数据重组。

use tracing::{debug, trace};

use super::ccb::{CcbFlags, Ccb, Ctx, TcpState};
use super::segment::Segment;
use crate::wire::TcpFlags;

impl Ccb {
    /// 处理一个已匹配到本连接的报文段。
    ///
    /// 按序数据会累积到 `recv_data`，由调用方在处理结束后交给应用。
    pub(crate) fn receive(&mut self, seg: &mut Segment, ctx: &mut Ctx<'_>) {
        if seg.flags().contains(TcpFlags::ACK) {
            self.process_ack(seg, ctx);
        }

        let rcv_wnd = self.rcv_wnd as u32;
        if seg.tcp_len() == 0 {
            let seqno = seg.seq();
            if seqno.lt(self.rcv_nxt) || seqno.geq(self.rcv_nxt + rcv_wnd) {
                self.ack_now();
            }
            return;
        }

        // 左边缘与已收数据重叠：裁掉重复部分
        let seqno = seg.seq();
        if seqno.lt(self.rcv_nxt) && self.rcv_nxt.lt(seg.end()) {
            let off = self.rcv_nxt.offset_from(seqno);
            seg.data.trim_front(off as usize);
            seg.hdr.seq = self.rcv_nxt;
        }

        let seqno = seg.seq();
        if !seqno.in_window(self.rcv_nxt, rcv_wnd) {
            trace!(conn = %self.id, seq = %seqno, rcv_nxt = %self.rcv_nxt, rcv_wnd, "segment outside receive window");
            self.ack_now();
            return;
        }

        if seqno == self.rcv_nxt {
            self.accept_in_order(seg);
            self.ack_delayed();
        } else {
            self.ack_now();
            let incoming = std::mem::take(seg);
            self.ooseq_insert(incoming, ctx.seg_room);
        }
    }

    fn process_ack(&mut self, seg: &Segment, ctx: &mut Ctx<'_>) {
        let ackno = seg.hdr.ack;
        let seqno = seg.seq();

        if self.snd_wl1.lt(seqno)
            || (self.snd_wl1 == seqno && self.snd_wl2.lt(ackno))
            || (self.snd_wl2 == ackno && seg.hdr.wnd > self.snd_wnd)
        {
            self.snd_wnd = seg.hdr.wnd;
            self.snd_wl1 = seqno;
            self.snd_wl2 = ackno;
            trace!(conn = %self.id, snd_wnd = self.snd_wnd, "window update");
        }

        if self.lastack == ackno {
            self.dupacks = self.dupacks.saturating_add(1);
            if self.dupacks >= 3 && !self.unacked.is_empty() {
                if !self.flags.contains(CcbFlags::INFR) {
                    debug!(conn = %self.id, dupacks = self.dupacks, lastack = %self.lastack, "fast retransmit");
                    self.rexmit_head(ctx);
                    let flight = self.snd_max.offset_from(self.lastack) / 2;
                    let floor = 2 * self.mss as u32;
                    self.ssthresh = flight.max(floor).min(u16::MAX as u32) as u16;
                    self.cwnd = self.ssthresh.saturating_add(self.mss.saturating_mul(3));
                    self.flags.insert(CcbFlags::INFR);
                } else {
                    self.cwnd = self.cwnd.saturating_add(self.mss);
                }
            }
        } else if self.lastack.lt(ackno) && ackno.leq(self.snd_max) {
            if self.flags.contains(CcbFlags::INFR) {
                self.flags.remove(CcbFlags::INFR);
                self.cwnd = self.ssthresh;
            }
            self.nrtx = 0;
            self.rtt.reset();

            self.acked = ackno.offset_from(self.lastack);
            let credit = self.snd_buf as u32 + self.acked;
            self.snd_buf = credit.min(self.cfg.snd_buf as u32) as u16;
            self.dupacks = 0;
            self.lastack = ackno;

            if self.state >= TcpState::Established {
                if self.cwnd < self.ssthresh {
                    self.cwnd = self.cwnd.saturating_add(self.mss);
                    trace!(conn = %self.id, cwnd = self.cwnd, "slow start");
                } else {
                    let mss = self.mss as u32;
                    let inc = mss * mss / (self.cwnd.max(1) as u32);
                    self.cwnd = (self.cwnd as u32 + inc).min(u16::MAX as u32) as u16;
                    trace!(conn = %self.id, cwnd = self.cwnd, "congestion avoidance");
                }
            }

            // 重传后的段可能仍在 unsent 上
            while self.unsent.front().is_some_and(|s| s.end().leq(ackno)) {
                if let Some(s) = self.unsent.pop_front() {
                    trace!(conn = %self.id, seq = %s.seq(), end = %s.end(), "removing from unsent");
                }
                if let Some(next) = self.unsent.front() {
                    self.snd_nxt = next.seq();
                }
            }
            while self.unacked.front().is_some_and(|s| s.end().leq(ackno)) {
                if let Some(s) = self.unacked.pop_front() {
                    trace!(conn = %self.id, seq = %s.seq(), end = %s.end(), "removing from unacked");
                }
            }
        }

        if let Some((sent_at, rtseq)) = self.rtt_probe {
            if rtseq.lt(ackno) {
                let m = ctx.ticks.wrapping_sub(sent_at) as i16;
                self.rtt.sample(m);
                trace!(conn = %self.id, rtt_ticks = m, rto = self.rtt.rto, "rtt sample");
                self.rtt_probe = None;
            }
        }
    }

    fn take_in_order(&mut self, seg: &mut Segment) {
        let tcplen = seg.tcp_len();
        self.rcv_nxt += tcplen;
        self.rcv_wnd = (self.rcv_wnd as u32).saturating_sub(tcplen) as u16;
        if !seg.data.is_empty() {
            let data = std::mem::take(&mut seg.data);
            match &mut self.recv_data {
                Some(buf) => buf.append(data),
                None => self.recv_data = Some(data),
            }
        }
        if seg.flags().contains(TcpFlags::FIN) {
            self.flags.insert(CcbFlags::GOT_FIN);
        }
    }

    fn accept_in_order(&mut self, seg: &mut Segment) {
        // 右边缘不能盖过乱序队列的第一个段
        if let Some(next) = self.ooseq.front() {
            if next.seq().lt(seg.end()) {
                let keep = next.seq().offset_from(seg.seq());
                seg.truncate(keep);
            }
        }
        self.take_in_order(seg);

        while self.ooseq.front().is_some_and(|s| s.seq().leq(self.rcv_nxt)) {
            let Some(mut cseg) = self.ooseq.pop_front() else {
                break;
            };
            if cseg.seq().lt(self.rcv_nxt) {
                let off = self.rcv_nxt.offset_from(cseg.seq());
                if off >= cseg.tcp_len() {
                    continue;
                }
                cseg.data.trim_front(off as usize);
                cseg.hdr.seq = self.rcv_nxt;
            }
            trace!(conn = %self.id, seq = %cseg.seq(), len = cseg.len(), "pulling segment from ooseq");
            self.take_in_order(&mut cseg);
        }
    }

    /// 按起始序号插入乱序队列，并裁剪以保持各段不重叠。
    ///
    /// 起始序号相同时保留较长的段；等长时保留已有的那个。
    fn ooseq_insert(&mut self, mut seg: Segment, seg_room: usize) {
        let seqno = seg.seq();
        let mut i = 0;
        while i < self.ooseq.len() {
            let next_seq = self.ooseq[i].seq();
            if seqno == next_seq {
                if seg.len() > self.ooseq[i].len() {
                    if let Some(after) = self.ooseq.get(i + 1) {
                        if seg.end().gt(after.seq()) {
                            let keep = after.seq().offset_from(seqno);
                            seg.truncate(keep);
                        }
                    }
                    trace!(conn = %self.id, seq = %seqno, len = seg.len(), "replacing shorter ooseq segment");
                    self.ooseq[i] = seg;
                }
                return;
            }
            if seqno.lt(next_seq) {
                break;
            }
            i += 1;
        }

        if self.segment_count() + 1 > seg_room {
            debug!(conn = %self.id, seq = %seqno, "no segment memory, dropping out-of-sequence data");
            return;
        }
        if let Some(next) = self.ooseq.get(i) {
            if seg.end().gt(next.seq()) {
                let keep = next.seq().offset_from(seqno);
                seg.truncate(keep);
            }
        }
        if i > 0 {
            let prev = &mut self.ooseq[i - 1];
            if prev.end().gt(seqno) {
                let keep = seqno.offset_from(prev.seq());
                prev.truncate(keep);
            }
        }
        trace!(conn = %self.id, seq = %seqno, len = seg.len(), at = i, "queueing out-of-sequence segment");
        self.ooseq.insert(i, seg);
    }
}
