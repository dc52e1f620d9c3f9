//! TCP 错误类型

/// 返回给 API 调用方或通过 `err` 回调通知应用的错误。
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TcpError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("buffer error")]
    BufferError,
    #[error("operation not allowed in current state")]
    WrongState,
    #[error("connection reset")]
    ConnectionReset,
    #[error("connection aborted")]
    Aborted,
    #[error("address in use")]
    AddrInUse,
    #[error("no route to host")]
    NoRoute,
    #[error("unknown connection")]
    UnknownConnection,
}
