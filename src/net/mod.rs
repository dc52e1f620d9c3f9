//! 网络模拟模块
//!
//! TCP 核心的外部协作者：`IpLayer` 接口与它的 `Outbox` 实现，主机与链路，
//! 投递到消息循环的各类消息，以及驱动连接的应用。

// 子模块声明
mod api;
mod app;
mod deliver;
mod host;
mod id;
mod ip;
mod link;
mod net_world;
mod network;
mod stats;
mod timer;

// 重新导出公共接口
pub use api::{Close, OpenActive, OpenListen, Reply, Write};
pub use app::{pattern_byte, App, BulkSender, SenderProgress, Sink, SinkProgress};
pub use deliver::DeliverDatagram;
pub use host::Host;
pub use id::{HostId, LinkId};
pub use ip::{Datagram, IpError, IpLayer, Outbox};
pub use link::Link;
pub use net_world::NetWorld;
pub use network::Network;
pub use stats::NetStats;
pub use timer::TcpTimer;
