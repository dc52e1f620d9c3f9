//! TCP 序号
//!
//! 序号空间为 32 位并回绕。两个序号按回绕差值的符号比较，同时平移后
//! `a.lt(b)` 仍然成立，跨越回绕边界也一样。该关系在整个空间上不可传递，
//! 所以 `SeqNum` 不实现 `PartialOrd`。

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// 序号或确认号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SeqNum(pub u32);

impl SeqNum {
    #[inline]
    fn diff(self, other: SeqNum) -> i32 {
        self.0.wrapping_sub(other.0) as i32
    }

    #[inline]
    pub fn lt(self, other: SeqNum) -> bool {
        self.diff(other) < 0
    }

    #[inline]
    pub fn leq(self, other: SeqNum) -> bool {
        self.diff(other) <= 0
    }

    #[inline]
    pub fn gt(self, other: SeqNum) -> bool {
        self.diff(other) > 0
    }

    #[inline]
    pub fn geq(self, other: SeqNum) -> bool {
        self.diff(other) >= 0
    }

    /// 是否落在半开区间 `[start, start + len)` 内
    pub fn in_window(self, start: SeqNum, len: u32) -> bool {
        self.geq(start) && self.lt(start + len)
    }

    /// 从 `base` 向前到 `self` 的距离（模 2^32）
    #[inline]
    pub fn offset_from(self, base: SeqNum) -> u32 {
        self.0.wrapping_sub(base.0)
    }

    pub fn max_seq(self, other: SeqNum) -> SeqNum {
        if self.lt(other) { other } else { self }
    }
}

impl Add<u32> for SeqNum {
    type Output = SeqNum;

    fn add(self, rhs: u32) -> SeqNum {
        SeqNum(self.0.wrapping_add(rhs))
    }
}

impl AddAssign<u32> for SeqNum {
    fn add_assign(&mut self, rhs: u32) {
        *self = *self + rhs;
    }
}

impl Sub<u32> for SeqNum {
    type Output = SeqNum;

    fn sub(self, rhs: u32) -> SeqNum {
        SeqNum(self.0.wrapping_sub(rhs))
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
