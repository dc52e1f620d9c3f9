//! 统计信息

use serde::Serialize;

/// 网络层计数器
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetStats {
    /// 上链路的数据报
    pub datagrams: u64,
    pub delivered: u64,
    /// 被链路丢弃
    pub dropped: u64,
    /// 目的地址没有对应主机或链路
    pub unreachable: u64,
}
