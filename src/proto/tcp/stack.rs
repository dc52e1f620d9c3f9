//! 协议栈实例
//!
//! 一个 `TcpStack` 拥有全部 CCB 与报文段。所有操作都在同一个串行的消息循环里
//! 调用，内部不加锁；IP 层以 `&mut dyn IpLayer` 的形式按调用传入。

use std::collections::HashSet;

use tracing::debug;

use super::ccb::{Ccb, ConnId, Ctx, TcpState};
use super::config::TcpConfig;
use super::error::TcpError;
use super::stats::TcpStats;
use super::table::ConnTable;
use crate::net::IpLayer;
use crate::wire::SeqNum;

#[derive(Debug)]
pub struct TcpStack {
    pub(crate) cfg: TcpConfig,
    pub(crate) table: ConnTable,
    /// 慢定时器计数
    pub(crate) ticks: u32,
    /// 粗定时器调用次数
    pub(crate) timer_calls: u32,
    iss: u32,
    next_port: u16,
    next_id: u64,
    pub stats: TcpStats,
}

impl Default for TcpStack {
    fn default() -> Self {
        Self::new(TcpConfig::default())
    }
}

impl TcpStack {
    pub fn new(cfg: TcpConfig) -> Self {
        Self {
            iss: cfg.iss_seed,
            next_port: cfg.ephemeral_port_base,
            cfg,
            table: ConnTable::default(),
            ticks: 0,
            timer_calls: 0,
            next_id: 1,
            stats: TcpStats::default(),
        }
    }

    pub fn config(&self) -> &TcpConfig {
        &self.cfg
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn table(&self) -> &ConnTable {
        &self.table
    }

    /// 是否还有需要定时器推进的连接（活动或 TIME-WAIT）
    pub fn has_timed_connections(&self) -> bool {
        self.table.active().next().is_some() || self.table.time_wait().next().is_some()
    }

    fn next_iss(&mut self) -> SeqNum {
        self.iss = self.iss.wrapping_add(self.ticks);
        SeqNum(self.iss)
    }

    pub(crate) fn next_ephemeral_port(&mut self) -> u16 {
        let base = self.cfg.ephemeral_port_base;
        loop {
            let port = self.next_port;
            self.next_port = self.next_port.checked_add(1).unwrap_or(base);
            if !self.table.port_in_use(port) {
                return port;
            }
        }
    }

    /// 分配一个新 CCB；超过 `max_ccbs` 时失败。
    pub(crate) fn alloc_ccb(&mut self) -> Result<Ccb, TcpError> {
        if self.table.len() >= self.cfg.max_ccbs {
            self.stats.memerr += 1;
            debug!(max = self.cfg.max_ccbs, "ccb allocation failed");
            return Err(TcpError::OutOfMemory);
        }
        let id = ConnId(self.next_id);
        self.next_id += 1;
        let iss = self.next_iss();
        Ok(Ccb::new(id, self.cfg.clone(), iss, self.ticks))
    }

    /// 不在表里的 CCB 还能用的报文段数
    pub(crate) fn seg_room(&self) -> usize {
        self.cfg
            .max_segments
            .saturating_sub(self.table.segments_in_use())
    }

    pub(crate) fn ctx<'a>(
        ip: &'a mut dyn IpLayer,
        stats: &'a mut TcpStats,
        ticks: u32,
        seg_room: usize,
    ) -> Ctx<'a> {
        Ctx {
            ip,
            stats,
            ticks,
            seg_room,
        }
    }

    /// 对表中的一个 CCB 执行操作：先取出再放回，避免与 stack 其他字段重叠借用。
    pub(crate) fn with_ccb<R>(
        &mut self,
        id: ConnId,
        ip: &mut dyn IpLayer,
        f: impl FnOnce(&mut Ccb, &mut Ctx<'_>) -> R,
    ) -> Result<R, TcpError> {
        let mut ccb = self.table.remove(id).ok_or(TcpError::UnknownConnection)?;
        let room = self.seg_room();
        let mut ctx = Self::ctx(ip, &mut self.stats, self.ticks, room);
        let r = f(&mut ccb, &mut ctx);
        self.table.register(ccb);
        Ok(r)
    }

    pub fn ccb(&self, id: ConnId) -> Option<&Ccb> {
        self.table.get(id)
    }

    pub fn state(&self, id: ConnId) -> Option<TcpState> {
        self.table.get(id).map(|c| c.state)
    }

    pub fn snd_buf(&self, id: ConnId) -> Option<u16> {
        self.table.get(id).map(|c| c.snd_buf)
    }

    pub fn connection_count(&self) -> usize {
        self.table.len()
    }

    pub fn segments_in_use(&self) -> usize {
        self.table.segments_in_use()
    }

    /// 全栈不变式：每个 CCB 自检通过，列表与状态一致，资源不超限。
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut ids = HashSet::new();
        for c in self.table.iter() {
            if !ids.insert(c.id) {
                return Err(format!("{}: registered twice", c.id));
            }
            c.check_invariants()?;
        }
        for c in self.table.active() {
            if matches!(c.state, TcpState::Listen | TcpState::TimeWait | TcpState::Closed) {
                return Err(format!("{}: {} on active list", c.id, c.state));
            }
        }
        if let Some(c) = self.table.time_wait().find(|c| c.state != TcpState::TimeWait) {
            return Err(format!("{}: {} on time-wait list", c.id, c.state));
        }
        if let Some(c) = self.table.listening().find(|c| c.state != TcpState::Listen) {
            return Err(format!("{}: {} on listen list", c.id, c.state));
        }
        if self.table.len() > self.cfg.max_ccbs {
            return Err(format!("{} ccbs exceed limit", self.table.len()));
        }
        if self.segments_in_use() > self.cfg.max_segments {
            return Err(format!("{} segments exceed limit", self.segments_in_use()));
        }
        Ok(())
    }
}
