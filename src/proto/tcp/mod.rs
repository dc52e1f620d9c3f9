//! TCP 协议核心
//!
//! 连接控制块与状态机、连接表、接收处理、发送引擎、RTT 估计与定时器。
//! 整个协议栈是一个 `TcpStack` 值，由单个消息循环串行驱动；
//! IP 层通过 `IpLayer` trait 按调用注入。

// 子模块声明
mod api;
mod callbacks;
mod ccb;
mod config;
mod error;
mod input;
mod output;
mod receive;
mod rtt;
mod segment;
mod stack;
mod stats;
mod table;
mod timer;

// 重新导出公共接口
pub use callbacks::{AcceptFn, Callbacks, ConnectedFn, ErrFn, RecvFn, SentFn};
pub use ccb::{Ccb, CcbFlags, ConnId, TcpState};
pub use config::{FAST_TMR_EVERY, SLOW_TMR_EVERY, SLOW_TMR_MS, TMR_INTERVAL_MS, TcpConfig};
pub use error::TcpError;
pub use input::Incoming;
pub use output::send_reset;
pub use rtt::RttEstimator;
pub use segment::Segment;
pub use stack::TcpStack;
pub use stats::TcpStats;
pub use table::{ConnTable, Slot};
