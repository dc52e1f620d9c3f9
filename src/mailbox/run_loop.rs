//! 消息循环
//!
//! 队列以 (处理时刻, 投递序号) 为键，同一时刻先投递的先处理。

use super::message::Message;
use super::time::LoopTime;
use super::world::World;
use std::collections::BTreeMap;
use tracing::{debug, info, trace};

type Slot = (LoopTime, u64);

#[derive(Default)]
pub struct Mailbox {
    now: LoopTime,
    next_seq: u64,
    q: BTreeMap<Slot, Box<dyn Message>>,
    handled: u64,
}

impl Mailbox {
    pub fn now(&self) -> LoopTime {
        self.now
    }

    /// 队列中尚未处理的消息数
    pub fn pending(&self) -> usize {
        self.q.len()
    }

    /// 已处理的消息数
    pub fn handled(&self) -> u64 {
        self.handled
    }

    /// 投递一条在 `at` 时刻处理的消息。早于当前时间的按当前时间处理。
    #[tracing::instrument(skip(self, msg), fields(msg_type = std::any::type_name::<M>(), at = %at))]
    pub fn post_at<M: Message>(&mut self, at: LoopTime, msg: M) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.q.insert((at.max(self.now), seq), Box::new(msg));
        trace!(seq, queue_size = self.q.len(), "message posted");
    }

    /// 投递一条立即处理的消息（排在同一时刻已有消息之后）。
    pub fn post<M: Message>(&mut self, msg: M) {
        self.post_at(self.now, msg);
    }

    fn dispatch(&mut self, at: LoopTime, msg: Box<dyn Message>, world: &mut dyn World) {
        self.now = at;
        self.handled += 1;
        msg.handle(self, world);
        world.on_tick(self);
    }

    /// 处理消息直到队列为空或下一条消息晚于 `until`。
    pub fn run_until(&mut self, until: LoopTime, world: &mut dyn World) {
        while self.q.first_key_value().is_some_and(|(&(at, _), _)| at <= until) {
            let Some(((at, _), msg)) = self.q.pop_first() else {
                break;
            };
            self.dispatch(at, msg, world);
        }
        self.now = self.now.max(until);
    }

    /// 处理所有消息直到队列为空。
    #[tracing::instrument(skip(self, world))]
    pub fn run(&mut self, world: &mut dyn World) {
        debug!(now = %self.now, queue_size = self.q.len(), "loop starting");
        let start = self.handled;
        while let Some(((at, _), msg)) = self.q.pop_first() {
            self.dispatch(at, msg, world);
        }
        info!(messages = self.handled - start, now = %self.now, "loop drained");
    }
}
