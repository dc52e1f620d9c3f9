//! 消息 trait

use super::run_loop::Mailbox;
use super::world::World;

/// 投递给消息循环的一条消息。`self: Box<Self>` 让处理函数拿到所有权。
pub trait Message: Send + 'static {
    fn handle(self: Box<Self>, mb: &mut Mailbox, world: &mut dyn World);
}
