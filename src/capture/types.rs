use serde::{Deserialize, Serialize};

use crate::wire::{Ipv4Packet, TcpHeader, IP_PROTO_TCP};

/// 一个经过链路的 TCP 报文段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRecord {
    /// 进入链路的时间（纳秒）
    pub t_ns: u64,
    pub from: String,
    pub to: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    /// 例如 "SYN|ACK"
    pub flags: String,
    /// 载荷字节数
    pub len: usize,
    pub wnd: u16,
    /// 是否被链路按丢包模式丢弃
    pub dropped: bool,
}

impl CaptureRecord {
    /// 从 IPv4 数据报解码；不是可解析的 TCP 报文时返回 `None`。
    pub fn from_datagram(
        t_ns: u64,
        from: &str,
        to: &str,
        bytes: &[u8],
        dropped: bool,
    ) -> Option<Self> {
        let pkt = Ipv4Packet::parse(bytes).ok()?;
        if pkt.proto != IP_PROTO_TCP {
            return None;
        }
        let (hdr, off) = TcpHeader::parse(pkt.payload).ok()?;
        let flags = hdr
            .flags
            .iter_names()
            .map(|(name, _)| name)
            .collect::<Vec<_>>()
            .join("|");
        Some(Self {
            t_ns,
            from: from.to_string(),
            to: to.to_string(),
            src_port: hdr.src_port,
            dst_port: hdr.dst_port,
            seq: hdr.seq.0,
            ack: hdr.ack.0,
            flags,
            len: pkt.payload.len() - off,
            wnd: hdr.wnd,
            dropped,
        })
    }
}

#[derive(Debug, Default)]
pub struct CaptureLog {
    pub records: Vec<CaptureRecord>,
}

impl CaptureLog {
    pub fn push(&mut self, rec: CaptureRecord) {
        self.records.push(rec);
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.records)
    }
}
