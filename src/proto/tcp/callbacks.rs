//! 应用回调
//!
//! 回调在协议栈内部同步调用，不能重入协议栈，必须尽快返回。需要在回调里
//! 记录状态的应用通常持有 `Arc<Mutex<_>>`。

use std::fmt;
use std::sync::Arc;

use super::ccb::ConnId;
use super::error::TcpError;
use crate::buf::PacketBuf;

/// 被动连接建立时调用，返回 `false` 会中止该连接。
pub type AcceptFn = Arc<dyn Fn(ConnId) -> bool + Send + Sync>;
pub type ConnectedFn = Arc<dyn Fn(ConnId) + Send + Sync>;
/// `Some(data)` 为按序到达的数据，`None` 表示对端关闭了发送方向。
/// 返回值是应用立即消费掉的字节数，会像 `recved` 一样重新打开接收窗口。
pub type RecvFn = Arc<dyn Fn(ConnId, Option<PacketBuf>) -> usize + Send + Sync>;
/// 参数是本次被确认的序列号单位数。
pub type SentFn = Arc<dyn Fn(ConnId, u32) + Send + Sync>;
pub type ErrFn = Arc<dyn Fn(ConnId, TcpError) + Send + Sync>;

/// 一组可选回调。监听连接的回调会复制到每个被接受的连接上。
#[derive(Clone, Default)]
pub struct Callbacks {
    pub accept: Option<AcceptFn>,
    pub connected: Option<ConnectedFn>,
    pub recv: Option<RecvFn>,
    pub sent: Option<SentFn>,
    pub err: Option<ErrFn>,
}

impl Callbacks {
    pub fn on_accept(mut self, f: impl Fn(ConnId) -> bool + Send + Sync + 'static) -> Self {
        self.accept = Some(Arc::new(f));
        self
    }

    pub fn on_connected(mut self, f: impl Fn(ConnId) + Send + Sync + 'static) -> Self {
        self.connected = Some(Arc::new(f));
        self
    }

    pub fn on_recv(
        mut self,
        f: impl Fn(ConnId, Option<PacketBuf>) -> usize + Send + Sync + 'static,
    ) -> Self {
        self.recv = Some(Arc::new(f));
        self
    }

    pub fn on_sent(mut self, f: impl Fn(ConnId, u32) + Send + Sync + 'static) -> Self {
        self.sent = Some(Arc::new(f));
        self
    }

    pub fn on_err(mut self, f: impl Fn(ConnId, TcpError) + Send + Sync + 'static) -> Self {
        self.err = Some(Arc::new(f));
        self
    }

    pub(crate) fn notify_err(&self, id: ConnId, e: TcpError) {
        if let Some(f) = &self.err {
            f(id, e);
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("accept", &self.accept.is_some())
            .field("connected", &self.connected.is_some())
            .field("recv", &self.recv.is_some())
            .field("sent", &self.sent.is_some())
            .field("err", &self.err.is_some())
            .finish()
    }
}
