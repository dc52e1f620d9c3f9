//! 应用驱动
//!
//! 每处理完一条消息，网络会轮询每台主机上的应用一次。应用在轮询里调用
//! 协议栈；回调只记录状态（回调内不能重入协议栈）。

use std::net::SocketAddrV4;
use std::sync::{Arc, Mutex};

use super::ip::IpLayer;
use crate::mailbox::LoopTime;
use crate::proto::tcp::{Callbacks, ConnId, TcpError, TcpStack};
use tracing::{debug, info, warn};

pub trait App: Send {
    fn poll(&mut self, tcp: &mut TcpStack, ip: &mut dyn IpLayer, now: LoopTime);
}

/// 第 `i` 个字节的内容，接收方据此校验。
pub fn pattern_byte(i: u64) -> u8 {
    (i % 251) as u8
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderProgress {
    pub conn: Option<ConnId>,
    pub connected: bool,
    /// 已交给协议栈的字节
    pub written: u64,
    /// 已被确认的序列号单位（含 SYN/FIN）
    pub acked: u64,
    pub closed: bool,
    pub error: Option<TcpError>,
    pub connected_at: Option<LoopTime>,
    pub closed_at: Option<LoopTime>,
}

/// 主动连接对端，按发送缓冲余量写入 `total` 字节，写完后关闭。
pub struct BulkSender {
    remote: SocketAddrV4,
    total: u64,
    opened: bool,
    progress: Arc<Mutex<SenderProgress>>,
}

impl BulkSender {
    pub fn new(remote: SocketAddrV4, total: u64) -> Self {
        Self {
            remote,
            total,
            opened: false,
            progress: Arc::new(Mutex::new(SenderProgress::default())),
        }
    }

    pub fn progress(&self) -> Arc<Mutex<SenderProgress>> {
        self.progress.clone()
    }

    fn open(&mut self, tcp: &mut TcpStack, ip: &mut dyn IpLayer) {
        self.opened = true;
        let Some(local_ip) = ip.route(*self.remote.ip()) else {
            warn!(remote = %self.remote, "no route for bulk sender");
            if let Ok(mut p) = self.progress.lock() {
                p.error = Some(TcpError::NoRoute);
            }
            return;
        };
        let on_conn = self.progress.clone();
        let on_sent = self.progress.clone();
        let on_err = self.progress.clone();
        let cb = Callbacks::default()
            .on_connected(move |_| {
                if let Ok(mut p) = on_conn.lock() {
                    p.connected = true;
                }
            })
            .on_sent(move |_, n| {
                if let Ok(mut p) = on_sent.lock() {
                    p.acked += n as u64;
                }
            })
            .on_err(move |_, e| {
                if let Ok(mut p) = on_err.lock() {
                    p.error = Some(e);
                }
            });
        let r = tcp.open_active(SocketAddrV4::new(local_ip, 0), self.remote, cb, ip);
        if let Ok(mut p) = self.progress.lock() {
            match r {
                Ok(id) => p.conn = Some(id),
                Err(e) => p.error = Some(e),
            }
        }
    }
}

impl App for BulkSender {
    fn poll(&mut self, tcp: &mut TcpStack, ip: &mut dyn IpLayer, now: LoopTime) {
        if !self.opened {
            self.open(tcp, ip);
            return;
        }
        let Ok(mut p) = self.progress.lock() else {
            return;
        };
        let Some(id) = p.conn else {
            return;
        };
        if !p.connected || p.closed || p.error.is_some() {
            return;
        }
        if p.connected_at.is_none() {
            p.connected_at = Some(now);
            info!(conn = %id, now = %now, "sender connected");
        }

        let mss = tcp.config().mss.max(1) as u64;
        while p.written < self.total {
            let room = tcp.snd_buf(id).unwrap_or(0) as u64;
            let n = room.min(mss).min(self.total - p.written);
            if n == 0 {
                break;
            }
            let chunk: Vec<u8> = (p.written..p.written + n).map(pattern_byte).collect();
            match tcp.write(id, &chunk, ip) {
                Ok(()) => p.written += n,
                Err(TcpError::OutOfMemory) => break,
                Err(e) => {
                    debug!(conn = %id, error = %e, "write failed");
                    p.error = Some(e);
                    return;
                }
            }
        }

        if p.written == self.total {
            match tcp.close(id, ip) {
                Ok(()) => {
                    p.closed = true;
                    p.closed_at = Some(now);
                    info!(conn = %id, bytes = p.written, now = %now, "sender closing");
                }
                Err(TcpError::OutOfMemory) => {}
                Err(e) => p.error = Some(e),
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkProgress {
    pub conn: Option<ConnId>,
    pub received: u64,
    /// 第一个与预期内容不符的字节偏移
    pub first_mismatch: Option<u64>,
    pub peer_closed: bool,
    pub closed: bool,
    pub error: Option<TcpError>,
    pub done_at: Option<LoopTime>,
}

/// 在 `port` 上监听，接受一个连接，计数并校验收到的字节；对端关闭后也关闭。
pub struct Sink {
    port: u16,
    listening: bool,
    progress: Arc<Mutex<SinkProgress>>,
}

impl Sink {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            listening: false,
            progress: Arc::new(Mutex::new(SinkProgress::default())),
        }
    }

    pub fn progress(&self) -> Arc<Mutex<SinkProgress>> {
        self.progress.clone()
    }

    fn callbacks(&self) -> Callbacks {
        let on_accept = self.progress.clone();
        let on_recv = self.progress.clone();
        let on_err = self.progress.clone();
        Callbacks::default()
            .on_accept(move |id| {
                let Ok(mut p) = on_accept.lock() else {
                    return false;
                };
                if p.conn.is_some() {
                    return false;
                }
                p.conn = Some(id);
                true
            })
            .on_recv(move |_, data| {
                let Ok(mut p) = on_recv.lock() else {
                    return 0;
                };
                let Some(data) = data else {
                    p.peer_closed = true;
                    return 0;
                };
                let bytes = data.to_vec();
                for (i, b) in bytes.iter().enumerate() {
                    let off = p.received + i as u64;
                    if p.first_mismatch.is_none() && *b != pattern_byte(off) {
                        p.first_mismatch = Some(off);
                    }
                }
                p.received += bytes.len() as u64;
                bytes.len()
            })
            .on_err(move |_, e| {
                if let Ok(mut p) = on_err.lock() {
                    p.error = Some(e);
                }
            })
    }
}

impl App for Sink {
    fn poll(&mut self, tcp: &mut TcpStack, ip: &mut dyn IpLayer, now: LoopTime) {
        if !self.listening {
            self.listening = true;
            let local = SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, self.port);
            if let Err(e) = tcp.open_listen(local, self.callbacks()) {
                warn!(port = self.port, error = %e, "listen failed");
                if let Ok(mut p) = self.progress.lock() {
                    p.error = Some(e);
                }
            }
            return;
        }
        let Ok(mut p) = self.progress.lock() else {
            return;
        };
        if !p.peer_closed || p.closed {
            return;
        }
        let Some(id) = p.conn else {
            return;
        };
        match tcp.close(id, ip) {
            Ok(()) | Err(TcpError::UnknownConnection) => {
                p.closed = true;
                p.done_at = Some(now);
                info!(conn = %id, bytes = p.received, now = %now, "sink closing");
            }
            Err(TcpError::OutOfMemory) => {}
            Err(e) => p.error = Some(e),
        }
    }
}
