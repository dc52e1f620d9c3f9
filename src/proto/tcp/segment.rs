//! 报文段

use std::net::Ipv4Addr;

use crate::buf::PacketBuf;
use crate::wire::{SeqNum, TcpFlags, TcpHeader};

/// 一个排队中的 TCP 报文段：头部 + 数据链。
///
/// 同一时刻只会挂在 unsent / unacked / ooseq 其中一个队列上。
#[derive(Debug, Clone, Default)]
pub struct Segment {
    pub hdr: TcpHeader,
    pub data: PacketBuf,
}

impl Segment {
    pub fn new(hdr: TcpHeader, data: PacketBuf) -> Self {
        Self { hdr, data }
    }

    pub fn seq(&self) -> SeqNum {
        self.hdr.seq
    }

    pub fn flags(&self) -> TcpFlags {
        self.hdr.flags
    }

    /// 数据字节数
    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 序列号空间长度：SYN 与 FIN 各占一个序号。
    pub fn tcp_len(&self) -> u32 {
        let ctl = self.hdr.flags.intersects(TcpFlags::SYN | TcpFlags::FIN) as u32;
        self.len() + ctl
    }

    /// 之后第一个不属于本段的序列号
    pub fn end(&self) -> SeqNum {
        self.seq() + self.tcp_len()
    }

    /// 缓冲块数量（发送队列长度按它计）
    pub fn buffers(&self) -> usize {
        self.data.chunk_count().max(1)
    }

    /// 截短到 `len` 个数据字节。FIN 在被截掉的尾部，一并去掉。
    pub fn truncate(&mut self, len: u32) {
        self.data.truncate(len as usize);
        self.hdr.flags.remove(TcpFlags::FIN);
    }

    pub fn fill_checksum(&mut self, src: Ipv4Addr, dst: Ipv4Addr) {
        let Segment { hdr, data } = self;
        hdr.fill_checksum(data.chunks(), src, dst);
    }

    /// 编码成可交给 IP 层的缓冲链。
    pub fn to_wire(&self) -> PacketBuf {
        let mut p = PacketBuf::from_vec(self.hdr.to_bytes());
        p.append(self.data.clone());
        p
    }
}
