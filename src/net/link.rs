//! 链路类型

use super::id::HostId;
use crate::mailbox::LoopTime;

/// 单向点到点链路：固定时延，可选的确定性丢包。
#[derive(Debug)]
pub struct Link {
    pub from: HostId,
    pub to: HostId,
    pub latency: LoopTime,
    /// 每第 N 个数据报丢一个；`None` 表示不丢包
    pub drop_every: Option<u64>,
    pub sent: u64,
    pub dropped: u64,
}

impl Link {
    pub fn new(from: HostId, to: HostId, latency: LoopTime, drop_every: Option<u64>) -> Self {
        Self {
            from,
            to,
            latency,
            drop_every: drop_every.filter(|n| *n > 0),
            sent: 0,
            dropped: 0,
        }
    }

    /// 记一个上链路的数据报，返回它是否被丢弃。
    pub(crate) fn admit(&mut self) -> bool {
        self.sent += 1;
        let drop = self.drop_every.is_some_and(|n| self.sent % n == 0);
        if drop {
            self.dropped += 1;
        }
        drop
    }
}
