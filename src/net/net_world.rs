//! 网络世界实现

use super::network::Network;
use crate::mailbox::{Mailbox, World};
use std::any::Any;

/// 默认的世界实现：持有 Network，每条消息之后冲刷一次出口。
#[derive(Debug, Default)]
pub struct NetWorld {
    pub net: Network,
}

impl World for NetWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn on_tick(&mut self, mb: &mut Mailbox) {
        self.net.flush(mb);
    }
}
