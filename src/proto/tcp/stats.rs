//! 协议栈计数器

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TcpStats {
    /// 发出的报文段（含重传、纯 ACK、RST）
    pub xmit: u64,
    /// 重传次数（快速重传 + 超时重传）
    pub rexmit: u64,
    /// 发出的 RST
    pub rst_sent: u64,
    /// 校验和错误或无法解析而丢弃的输入
    pub dropped: u64,
    /// 因资源上限失败的分配
    pub memerr: u64,
    /// RTO 触发次数
    pub rto_fired: u64,
}
