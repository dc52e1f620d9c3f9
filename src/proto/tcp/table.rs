//! 连接表：活动、TIME-WAIT、监听三个列表。

use std::collections::VecDeque;
use std::net::SocketAddrV4;

use super::ccb::{Ccb, ConnId, TcpState};

/// 查找结果所在的位置。活动与监听命中后会被移到表头，所以位置总是 0。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Active,
    TimeWait(usize),
    Listen,
}

#[derive(Debug, Default)]
pub struct ConnTable {
    active: VecDeque<Ccb>,
    tw: VecDeque<Ccb>,
    listen: VecDeque<Ccb>,
}

impl ConnTable {
    /// 为入站报文（目的 `local`，来源 `remote`）查找连接。
    ///
    /// 依次查活动列表（四元组精确匹配）、TIME-WAIT 列表（精确匹配，不调整顺序）、
    /// 监听列表（本地端口相同，本地地址相同或为通配）。
    pub fn find(&mut self, local: SocketAddrV4, remote: SocketAddrV4) -> Option<Slot> {
        if let Some(i) = self
            .active
            .iter()
            .position(|c| c.local == local && c.remote == remote)
        {
            move_to_front(&mut self.active, i);
            return Some(Slot::Active);
        }
        if let Some(i) = self
            .tw
            .iter()
            .position(|c| c.local == local && c.remote == remote)
        {
            return Some(Slot::TimeWait(i));
        }
        if let Some(i) = self.listen.iter().position(|c| {
            c.local.port() == local.port()
                && (c.local.ip().is_unspecified() || c.local.ip() == local.ip())
        }) {
            move_to_front(&mut self.listen, i);
            return Some(Slot::Listen);
        }
        None
    }

    pub fn slot(&self, slot: Slot) -> Option<&Ccb> {
        match slot {
            Slot::Active => self.active.front(),
            Slot::TimeWait(i) => self.tw.get(i),
            Slot::Listen => self.listen.front(),
        }
    }

    pub(crate) fn take(&mut self, slot: Slot) -> Option<Ccb> {
        match slot {
            Slot::Active => self.active.pop_front(),
            Slot::TimeWait(i) => self.tw.remove(i),
            Slot::Listen => self.listen.pop_front(),
        }
    }

    pub(crate) fn restore(&mut self, slot: Slot, ccb: Ccb) {
        match slot {
            Slot::Active => self.active.push_front(ccb),
            Slot::TimeWait(i) => {
                let i = i.min(self.tw.len());
                self.tw.insert(i, ccb);
            }
            Slot::Listen => self.listen.push_front(ccb),
        }
    }

    pub(crate) fn register(&mut self, ccb: Ccb) {
        match ccb.state {
            TcpState::Listen => self.listen.push_front(ccb),
            TcpState::TimeWait => self.tw.push_front(ccb),
            _ => self.active.push_front(ccb),
        }
    }

    pub(crate) fn remove(&mut self, id: ConnId) -> Option<Ccb> {
        for list in [&mut self.active, &mut self.tw, &mut self.listen] {
            if let Some(i) = list.iter().position(|c| c.id == id) {
                return list.remove(i);
            }
        }
        None
    }

    pub fn get(&self, id: ConnId) -> Option<&Ccb> {
        self.iter().find(|c| c.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: ConnId) -> Option<&mut Ccb> {
        self.active
            .iter_mut()
            .chain(self.tw.iter_mut())
            .chain(self.listen.iter_mut())
            .find(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ccb> + '_ {
        self.active
            .iter()
            .chain(self.tw.iter())
            .chain(self.listen.iter())
    }

    pub fn active(&self) -> impl Iterator<Item = &Ccb> + '_ {
        self.active.iter()
    }

    pub fn time_wait(&self) -> impl Iterator<Item = &Ccb> + '_ {
        self.tw.iter()
    }

    pub fn listening(&self) -> impl Iterator<Item = &Ccb> + '_ {
        self.listen.iter()
    }

    pub(crate) fn active_ids(&self) -> Vec<ConnId> {
        self.active.iter().map(|c| c.id).collect()
    }

    pub(crate) fn time_wait_ids(&self) -> Vec<ConnId> {
        self.tw.iter().map(|c| c.id).collect()
    }

    pub fn len(&self) -> usize {
        self.active.len() + self.tw.len() + self.listen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn segments_in_use(&self) -> usize {
        self.iter().map(Ccb::segment_count).sum()
    }

    /// 本地端口被占用，且地址重叠（相同或任一方为通配）
    pub fn local_in_use(&self, local: SocketAddrV4) -> bool {
        self.active.iter().chain(self.listen.iter()).any(|c| {
            c.local.port() == local.port()
                && (c.local.ip() == local.ip()
                    || c.local.ip().is_unspecified()
                    || local.ip().is_unspecified())
        })
    }

    pub fn port_in_use(&self, port: u16) -> bool {
        self.iter().any(|c| c.local.port() == port)
    }
}

fn move_to_front(list: &mut VecDeque<Ccb>, i: usize) {
    if i > 0 {
        if let Some(c) = list.remove(i) {
            list.push_front(c);
        }
    }
}
