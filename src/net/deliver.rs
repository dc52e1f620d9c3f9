//! 数据报交付消息

use super::id::HostId;
use super::net_world::NetWorld;
use crate::mailbox::{Mailbox, Message, World};
use tracing::trace;

/// 消息：把一个 IPv4 数据报交给某台主机。
#[derive(Debug)]
pub struct DeliverDatagram {
    pub to: HostId,
    pub bytes: Vec<u8>,
}

impl Message for DeliverDatagram {
    fn handle(self: Box<Self>, mb: &mut Mailbox, world: &mut dyn World) {
        let DeliverDatagram { to, bytes } = *self;
        trace!(to = %to, len = bytes.len(), now = %mb.now(), "datagram arrives");
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.net.deliver(to, &bytes);
    }
}
