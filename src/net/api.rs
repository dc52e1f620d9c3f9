//! 应用请求消息
//!
//! 应用对协议栈的调用都包装成消息，与入站报文、定时器走同一个消息循环。
//! 结果通过可选的 `reply` 闭包返回。

use std::net::SocketAddrV4;

use super::id::HostId;
use super::net_world::NetWorld;
use crate::mailbox::{Mailbox, Message, World};
use crate::proto::tcp::{Callbacks, ConnId, TcpError};
use tracing::warn;

/// 请求结果的回传闭包
pub type Reply<T> = Box<dyn FnOnce(Result<T, TcpError>) + Send>;

fn net_world(world: &mut dyn World) -> &mut NetWorld {
    world
        .as_any_mut()
        .downcast_mut::<NetWorld>()
        .expect("world must be NetWorld")
}

fn answer<T>(reply: Option<Reply<T>>, r: Option<Result<T, TcpError>>, host: HostId) {
    let r = r.unwrap_or_else(|| {
        warn!(host = %host, "request for unknown host");
        Err(TcpError::UnknownConnection)
    });
    if let Some(f) = reply {
        f(r);
    }
}

pub struct OpenActive {
    pub host: HostId,
    /// 端口 0 表示临时端口
    pub local_port: u16,
    pub remote: SocketAddrV4,
    pub callbacks: Callbacks,
    pub reply: Option<Reply<ConnId>>,
}

impl Message for OpenActive {
    fn handle(self: Box<Self>, _mb: &mut Mailbox, world: &mut dyn World) {
        let OpenActive { host, local_port, remote, callbacks, reply } = *self;
        let r = net_world(world).net.with_host(host, |tcp, ip| {
            let local = ip
                .route(*remote.ip())
                .map(|a| SocketAddrV4::new(a, local_port))
                .ok_or(TcpError::NoRoute)?;
            tcp.open_active(local, remote, callbacks, ip)
        });
        answer(reply, r, host);
    }
}

pub struct OpenListen {
    pub host: HostId,
    pub port: u16,
    pub callbacks: Callbacks,
    pub reply: Option<Reply<ConnId>>,
}

impl Message for OpenListen {
    fn handle(self: Box<Self>, _mb: &mut Mailbox, world: &mut dyn World) {
        let OpenListen { host, port, callbacks, reply } = *self;
        let r = net_world(world).net.with_host(host, |tcp, _ip| {
            tcp.open_listen(SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, port), callbacks)
        });
        answer(reply, r, host);
    }
}

pub struct Write {
    pub host: HostId,
    pub conn: ConnId,
    pub data: Vec<u8>,
    pub reply: Option<Reply<()>>,
}

impl Message for Write {
    fn handle(self: Box<Self>, _mb: &mut Mailbox, world: &mut dyn World) {
        let Write { host, conn, data, reply } = *self;
        let r = net_world(world)
            .net
            .with_host(host, |tcp, ip| tcp.write(conn, &data, ip));
        answer(reply, r, host);
    }
}

pub struct Close {
    pub host: HostId,
    pub conn: ConnId,
    pub reply: Option<Reply<()>>,
}

impl Message for Close {
    fn handle(self: Box<Self>, _mb: &mut Mailbox, world: &mut dyn World) {
        let Close { host, conn, reply } = *self;
        let r = net_world(world).net.with_host(host, |tcp, ip| tcp.close(conn, ip));
        answer(reply, r, host);
    }
}
