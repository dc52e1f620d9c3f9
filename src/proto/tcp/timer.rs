//! 定时器：延迟 ACK（快）与重传 / FIN-WAIT-2 / TIME-WAIT（慢）。

use tracing::{debug, info, trace, warn};

use super::ccb::{CcbFlags, Ccb, Ctx, TcpState};
use super::config::{FAST_TMR_EVERY, SLOW_TMR_EVERY};
use super::error::TcpError;
use super::stack::TcpStack;
use crate::net::IpLayer;

impl Ccb {
    /// 慢定时器对一个活动连接的处理。返回 `Some(原因)` 表示应当拆除。
    pub(crate) fn slow_tick(&mut self, ctx: &mut Ctx<'_>) -> Option<&'static str> {
        if self.state == TcpState::SynSent && self.nrtx >= self.cfg.syn_max_rtx {
            return Some("SYN retransmissions exhausted");
        }
        if self.nrtx >= self.cfg.max_rtx {
            return Some("retransmissions exhausted");
        }

        self.rtime = self.rtime.saturating_add(1);
        if !self.unacked.is_empty() && self.rtime as i32 >= self.rtt.rto as i32 {
            if self.state != TcpState::SynSent {
                self.rtt.backoff(self.nrtx);
            }
            debug!(conn = %self.id, rtime = self.rtime, rto = self.rtt.rto, nrtx = self.nrtx, "retransmission timeout");
            ctx.stats.rto_fired += 1;
            self.rexmit_head(ctx);

            let eff = self.cwnd.min(self.snd_wnd);
            self.ssthresh = eff >> 1;
            if self.ssthresh < self.mss {
                self.ssthresh = self.mss.saturating_mul(2);
            }
            self.cwnd = self.mss;
            trace!(conn = %self.id, cwnd = self.cwnd, ssthresh = self.ssthresh, "window reset after timeout");
        }

        if self.state == TcpState::FinWait2
            && ctx.ticks.wrapping_sub(self.tmr) > self.cfg.fin_wait_ticks()
        {
            return Some("FIN_WAIT_2 timeout");
        }
        None
    }
}

impl TcpStack {
    /// 粗定时器，每 `TMR_INTERVAL_MS` 调用一次。
    pub fn tmr(&mut self, ip: &mut dyn IpLayer) {
        self.timer_calls = self.timer_calls.wrapping_add(1);
        if self.timer_calls % FAST_TMR_EVERY == 0 {
            self.fast_tmr(ip);
        }
        if self.timer_calls % SLOW_TMR_EVERY == 0 {
            self.slow_tmr(ip);
        }
    }

    /// 把挂起的延迟 ACK 发出去。
    pub fn fast_tmr(&mut self, ip: &mut dyn IpLayer) {
        for id in self.table.active_ids() {
            let delayed = self
                .table
                .get(id)
                .is_some_and(|c| c.flags.contains(CcbFlags::ACK_DELAY));
            if !delayed {
                continue;
            }
            let r = self.with_ccb(id, ip, |ccb, ctx| {
                trace!(conn = %ccb.id, "delayed ACK");
                ccb.ack_now();
                ccb.output(ctx)
            });
            if let Ok(Err(e)) = r {
                debug!(conn = %id, error = %e, "delayed ACK output failed");
            }
        }
    }

    /// 推进 tick，处理重传超时，回收超时的 FIN-WAIT-2 与 TIME-WAIT 连接。
    #[tracing::instrument(skip(self, ip), fields(ticks = self.ticks))]
    pub fn slow_tmr(&mut self, ip: &mut dyn IpLayer) {
        self.ticks = self.ticks.wrapping_add(1);

        for id in self.table.active_ids() {
            let Some(mut ccb) = self.table.remove(id) else {
                continue;
            };
            let room = self.seg_room();
            let mut ctx = Self::ctx(ip, &mut self.stats, self.ticks, room);
            match ccb.slow_tick(&mut ctx) {
                None => self.table.register(ccb),
                Some(reason) => {
                    warn!(conn = %id, state = %ccb.state, reason, "dropping connection");
                    ccb.purge();
                    ccb.callbacks.notify_err(id, TcpError::Aborted);
                }
            }
        }

        let limit = self.cfg.time_wait_ticks();
        for id in self.table.time_wait_ids() {
            let expired = self
                .table
                .get(id)
                .is_some_and(|c| self.ticks.wrapping_sub(c.tmr) > limit);
            if expired {
                if let Some(ccb) = self.table.remove(id) {
                    info!(conn = %ccb.id, local = %ccb.local, remote = %ccb.remote, "TIME_WAIT expired");
                }
            }
        }
    }
}
