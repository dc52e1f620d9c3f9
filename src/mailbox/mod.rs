//! 消息循环模块
//!
//! 单线程、按时间排序的消息队列：所有输入报文、应用请求与定时器都作为消息
//! 投递到同一个 `Mailbox`，逐条串行处理。

// 子模块声明
mod message;
mod run_loop;
mod time;
mod world;

// 重新导出公共接口
pub use message::Message;
pub use run_loop::Mailbox;
pub use time::LoopTime;
pub use world::World;
