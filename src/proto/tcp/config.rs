//! TCP 协议栈配置

use serde::{Deserialize, Serialize};

/// 粗粒度定时器周期（毫秒）。`TcpStack::tmr` 应按此周期调用。
pub const TMR_INTERVAL_MS: u64 = 100;
/// 每 N 次粗定时器触发一次快定时器（延迟 ACK）。
pub const FAST_TMR_EVERY: u32 = 2;
/// 每 N 次粗定时器触发一次慢定时器（RTO / TIME-WAIT）。
pub const SLOW_TMR_EVERY: u32 = 5;
/// 慢定时器周期，也是 RTT 计时的 tick 单位。
pub const SLOW_TMR_MS: u64 = TMR_INTERVAL_MS * SLOW_TMR_EVERY as u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    /// 本端 MSS（字节），也是对端 MSS 选项的上限
    pub mss: u16,
    /// 接收窗口（字节）
    pub wnd: u16,
    /// 发送缓冲区（字节）
    pub snd_buf: u16,
    /// 发送队列最多挂多少个缓冲块；不填时取 4·snd_buf/mss
    pub snd_queuelen: Option<usize>,
    /// 同时存在的连接控制块上限
    pub max_ccbs: usize,
    /// 全栈共享的报文段上限（发送队列 + 乱序队列）
    pub max_segments: usize,
    /// 初始 RTO（慢定时器 tick）
    pub initial_rto_ticks: u16,
    /// 超过该重传次数则放弃连接
    pub max_rtx: u8,
    /// SYN 的最大重传次数
    pub syn_max_rtx: u8,
    /// 最大报文段生存期（毫秒），TIME-WAIT 持续 2·MSL
    pub msl_ms: u64,
    /// FIN-WAIT-2 空闲超时（毫秒）
    pub fin_wait_timeout_ms: u64,
    /// ISS 生成器初值
    pub iss_seed: u32,
    /// 临时端口起点
    pub ephemeral_port_base: u16,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            mss: 1460,
            wnd: 8760,
            snd_buf: 8760,
            snd_queuelen: None,
            max_ccbs: 16,
            max_segments: 256,
            initial_rto_ticks: 6,
            max_rtx: 12,
            syn_max_rtx: 6,
            msl_ms: 60_000,
            fin_wait_timeout_ms: 20_000,
            iss_seed: 6510,
            ephemeral_port_base: 4096,
        }
    }
}

impl TcpConfig {
    /// 发送队列长度上限，随当前 `mss` 与 `snd_buf` 计算
    pub fn snd_queuelen_limit(&self) -> usize {
        self.snd_queuelen
            .unwrap_or_else(|| 4 * self.snd_buf as usize / self.mss.max(1) as usize)
    }

    /// TIME-WAIT 持续的慢定时器 tick 数
    pub fn time_wait_ticks(&self) -> u32 {
        (2 * self.msl_ms / SLOW_TMR_MS) as u32
    }

    pub fn fin_wait_ticks(&self) -> u32 {
        (self.fin_wait_timeout_ms / SLOW_TMR_MS) as u32
    }
}
