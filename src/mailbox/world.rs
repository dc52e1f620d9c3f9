//! 世界 trait

use super::run_loop::Mailbox;
use std::any::Any;

/// 消息处理时可变访问的全部状态，由上层实现（例如 `NetWorld`）。
pub trait World: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// 每处理完一条消息后调用一次。
    fn on_tick(&mut self, _mb: &mut Mailbox) {}
}
