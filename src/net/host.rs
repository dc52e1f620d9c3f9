//! 主机：一个 TCP 协议栈加一个 IP 出口。

use std::net::Ipv4Addr;

use super::app::App;
use super::id::HostId;
use super::ip::Outbox;
use crate::proto::tcp::{TcpConfig, TcpStack};

pub struct Host {
    pub id: HostId,
    pub name: String,
    pub tcp: TcpStack,
    pub outbox: Outbox,
    pub(crate) app: Option<Box<dyn App>>,
    /// 是否已有一个 `TcpTimer` 在排队
    pub(crate) timer_armed: bool,
}

impl Host {
    pub fn new(id: HostId, name: impl Into<String>, addr: Ipv4Addr, cfg: TcpConfig) -> Self {
        Self {
            id,
            name: name.into(),
            tcp: TcpStack::new(cfg),
            outbox: Outbox::new(addr),
            app: None,
            timer_armed: false,
        }
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.outbox.addr()
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("addr", &self.addr())
            .field("connections", &self.tcp.connection_count())
            .field("app", &self.app.is_some())
            .finish()
    }
}
