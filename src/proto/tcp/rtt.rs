//! RTT / RTO 估计（Jacobson/Karels）
//!
//! `sa` 是放大 8 倍的平滑 RTT，`sv` 是放大 4 倍的平均偏差，单位都是慢定时器 tick。

/// 第 n 次重传时 RTO 左移的位数
const BACKOFF: [u8; 13] = [1, 2, 3, 4, 5, 6, 7, 7, 7, 7, 7, 7, 7];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RttEstimator {
    pub sa: i16,
    pub sv: i16,
    pub rto: i16,
}

impl RttEstimator {
    pub fn new(initial_rto: u16) -> Self {
        let init = initial_rto.min(i16::MAX as u16) as i16;
        Self {
            sa: 0,
            sv: init,
            rto: init,
        }
    }

    /// 用一次测得的 RTT（tick）更新估计。
    pub fn sample(&mut self, measured: i16) {
        let mut m = measured.wrapping_sub(self.sa >> 3);
        self.sa = self.sa.wrapping_add(m);
        if m < 0 {
            m = m.wrapping_neg();
        }
        m = m.wrapping_sub(self.sv >> 2);
        self.sv = self.sv.wrapping_add(m);
        self.reset();
    }

    /// 不带退避的 RTO
    pub fn reset(&mut self) {
        self.rto = (self.sa >> 3).saturating_add(self.sv);
    }

    /// 第 `nrtx` 次重传前的指数退避
    pub fn backoff(&mut self, nrtx: u8) {
        let shift = BACKOFF[(nrtx as usize).min(BACKOFF.len() - 1)];
        let base = ((self.sa >> 3) as i32).saturating_add(self.sv as i32);
        self.rto = (base << shift).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
    }
}
