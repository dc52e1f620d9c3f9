//! 网络拓扑管理
//!
//! 主机之间用单向链路相连。每处理完一条消息，`flush` 轮询各主机的应用，
//! 取走 IP 出口里的数据报，按链路时延投递为 `DeliverDatagram` 消息。

use std::collections::HashMap;
use std::net::Ipv4Addr;

use super::app::App;
use super::deliver::DeliverDatagram;
use super::host::Host;
use super::id::{HostId, LinkId};
use super::ip::IpLayer;
use super::link::Link;
use super::stats::NetStats;
use super::timer::TcpTimer;
use crate::capture::{CaptureLog, CaptureRecord};
use crate::mailbox::{LoopTime, Mailbox};
use crate::proto::tcp::{TcpConfig, TcpStack, TMR_INTERVAL_MS};
use tracing::{debug, trace, warn};

#[derive(Debug, Default)]
pub struct Network {
    hosts: Vec<Host>,
    links: Vec<Link>,
    edges: HashMap<(HostId, HostId), LinkId>,
    by_addr: HashMap<Ipv4Addr, HostId>,
    pub stats: NetStats,
    pub capture: Option<CaptureLog>,
}

impl Network {
    /// 添加主机
    pub fn add_host(&mut self, name: impl Into<String>, addr: Ipv4Addr, cfg: TcpConfig) -> HostId {
        let id = HostId(self.hosts.len());
        self.hosts.push(Host::new(id, name, addr, cfg));
        self.by_addr.insert(addr, id);
        id
    }

    /// 双向连接两台主机（两条对称的单向链路）
    pub fn connect(
        &mut self,
        a: HostId,
        b: HostId,
        latency: LoopTime,
        drop_every: Option<u64>,
    ) -> (LinkId, LinkId) {
        let ab = self.add_link(a, b, latency, drop_every);
        let ba = self.add_link(b, a, latency, drop_every);
        (ab, ba)
    }

    fn add_link(&mut self, from: HostId, to: HostId, latency: LoopTime, drop_every: Option<u64>) -> LinkId {
        let id = LinkId(self.links.len());
        self.links.push(Link::new(from, to, latency, drop_every));
        self.edges.insert((from, to), id);
        let to_addr = self.hosts[to.0].addr();
        self.hosts[from.0].outbox.add_neighbor(to_addr);
        id
    }

    pub fn host(&self, id: HostId) -> Option<&Host> {
        self.hosts.get(id.0)
    }

    pub fn host_mut(&mut self, id: HostId) -> Option<&mut Host> {
        self.hosts.get_mut(id.0)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> + '_ {
        self.hosts.iter()
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.0)
    }

    pub fn set_app(&mut self, host: HostId, app: impl App + 'static) {
        if let Some(h) = self.hosts.get_mut(host.0) {
            h.app = Some(Box::new(app));
        }
    }

    /// 以 (协议栈, IP 层) 的形式访问一台主机。
    pub fn with_host<R>(
        &mut self,
        id: HostId,
        f: impl FnOnce(&mut TcpStack, &mut dyn IpLayer) -> R,
    ) -> Option<R> {
        let h = self.hosts.get_mut(id.0)?;
        Some(f(&mut h.tcp, &mut h.outbox))
    }

    /// 把一个数据报交给目的主机的协议栈
    #[tracing::instrument(skip(self, bytes), fields(to = %to, len = bytes.len()))]
    pub fn deliver(&mut self, to: HostId, bytes: &[u8]) {
        let Some(h) = self.hosts.get_mut(to.0) else {
            warn!("datagram for unknown host");
            return;
        };
        self.stats.delivered += 1;
        if let Err(e) = h.tcp.deliver_datagram(bytes, &mut h.outbox) {
            debug!(host = %h.name, error = %e, "datagram rejected");
        }
    }

    /// 主机的 TCP 定时器到期
    pub(crate) fn on_timer(&mut self, host: HostId, mb: &mut Mailbox) {
        let Some(h) = self.hosts.get_mut(host.0) else {
            return;
        };
        h.tcp.tmr(&mut h.outbox);
        if h.tcp.has_timed_connections() {
            let at = mb.now().saturating_add(LoopTime::from_millis(TMR_INTERVAL_MS));
            mb.post_at(at, TcpTimer { host });
        } else {
            trace!(host = %h.name, "no timed connections, timer idle");
            h.timer_armed = false;
        }
    }

    /// 轮询应用、取走所有出口数据报并调度投递，必要时启动定时器。
    pub fn flush(&mut self, mb: &mut Mailbox) {
        let now = mb.now();
        let mut outgoing = Vec::new();
        for h in &mut self.hosts {
            if let Some(mut app) = h.app.take() {
                app.poll(&mut h.tcp, &mut h.outbox, now);
                h.app = Some(app);
            }
            for d in h.outbox.drain() {
                outgoing.push((h.id, d));
            }
            if !h.timer_armed && h.tcp.has_timed_connections() {
                h.timer_armed = true;
                let at = now.saturating_add(LoopTime::from_millis(TMR_INTERVAL_MS));
                mb.post_at(at, TcpTimer { host: h.id });
            }
        }

        for (from, d) in outgoing {
            self.stats.datagrams += 1;
            let Some(&to) = self.by_addr.get(&d.dst) else {
                self.stats.unreachable += 1;
                continue;
            };
            let Some(&link_id) = self.edges.get(&(from, to)) else {
                self.stats.unreachable += 1;
                continue;
            };
            let link = &mut self.links[link_id.0];
            let dropped = link.admit();
            let arrive = now.saturating_add(link.latency);
            if let Some(cap) = &mut self.capture {
                let (fname, tname) = (&self.hosts[from.0].name, &self.hosts[to.0].name);
                if let Some(rec) = CaptureRecord::from_datagram(now.0, fname, tname, &d.bytes, dropped) {
                    cap.push(rec);
                }
            }
            if dropped {
                self.stats.dropped += 1;
                debug!(from = %from, to = %to, "datagram dropped by link");
                continue;
            }
            mb.post_at(arrive, DeliverDatagram { to, bytes: d.bytes });
        }
    }
}
