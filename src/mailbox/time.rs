//! 循环时间（纳秒）

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct LoopTime(pub u64);

impl LoopTime {
    pub const ZERO: LoopTime = LoopTime(0);

    pub fn from_micros(us: u64) -> LoopTime {
        LoopTime(us.saturating_mul(1_000))
    }
    pub fn from_millis(ms: u64) -> LoopTime {
        LoopTime(ms.saturating_mul(1_000_000))
    }
    pub fn from_secs(s: u64) -> LoopTime {
        LoopTime(s.saturating_mul(1_000_000_000))
    }

    pub fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    pub fn saturating_add(self, d: LoopTime) -> LoopTime {
        LoopTime(self.0.saturating_add(d.0))
    }
}

impl fmt::Display for LoopTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}ms", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}
