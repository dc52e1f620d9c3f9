//! IP 层接口
//!
//! TCP 核心只通过 `IpLayer` 与下层交互：交出一个完整的报文段让 IP 层发送，
//! 以及在本地地址未绑定时查询路由。

use std::collections::HashSet;
use std::net::Ipv4Addr;

use tracing::trace;

use crate::buf::PacketBuf;
use crate::wire::encode_datagram;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IpError {
    #[error("no route to {0}")]
    NoRoute(Ipv4Addr),
    #[error("{0} unreachable")]
    Unreachable(Ipv4Addr),
}

pub trait IpLayer {
    /// 发送一个报文段；返回值仅供参考，TCP 不会因错误重试。
    fn ip_output(
        &mut self,
        seg: PacketBuf,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        proto: u8,
    ) -> Result<(), IpError>;

    /// 到 `dst` 应该使用的本地地址
    fn route(&self, dst: Ipv4Addr) -> Option<Ipv4Addr>;
}

/// 一个已编码、等待上链路的 IPv4 数据报
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub dst: Ipv4Addr,
    pub bytes: Vec<u8>,
}

/// 主机的 IP 出口：把报文段封装成 IPv4 数据报暂存，由网络在消息处理后统一取走。
#[derive(Debug)]
pub struct Outbox {
    addr: Ipv4Addr,
    neighbors: HashSet<Ipv4Addr>,
    queue: Vec<Datagram>,
    ident: u16,
}

impl Outbox {
    pub fn new(addr: Ipv4Addr) -> Self {
        Self {
            addr,
            neighbors: HashSet::new(),
            queue: Vec::new(),
            ident: 0,
        }
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    /// 登记一个直连邻居
    pub fn add_neighbor(&mut self, addr: Ipv4Addr) {
        self.neighbors.insert(addr);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn drain(&mut self) -> Vec<Datagram> {
        std::mem::take(&mut self.queue)
    }
}

impl IpLayer for Outbox {
    fn ip_output(
        &mut self,
        seg: PacketBuf,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        proto: u8,
    ) -> Result<(), IpError> {
        if !self.neighbors.contains(&dst) {
            return Err(IpError::NoRoute(dst));
        }
        let ident = self.ident;
        self.ident = self.ident.wrapping_add(1);
        let bytes = encode_datagram(src, dst, proto, ident, &seg.to_vec());
        trace!(src = %src, dst = %dst, len = bytes.len(), ident, "datagram queued");
        self.queue.push(Datagram { dst, bytes });
        Ok(())
    }

    fn route(&self, dst: Ipv4Addr) -> Option<Ipv4Addr> {
        self.neighbors.contains(&dst).then_some(self.addr)
    }
}
