//! TCP 定时器消息

use super::id::HostId;
use super::net_world::NetWorld;
use crate::mailbox::{Mailbox, Message, World};

/// 消息：驱动一台主机的 `TcpStack::tmr`。主机还有连接时自动续期。
#[derive(Debug)]
pub struct TcpTimer {
    pub host: HostId,
}

impl Message for TcpTimer {
    fn handle(self: Box<Self>, mb: &mut Mailbox, world: &mut dyn World) {
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.net.on_timer(self.host, mb);
    }
}
