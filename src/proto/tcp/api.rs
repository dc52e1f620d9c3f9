//! 应用接口：打开、写入、关闭、中止连接。

use std::net::SocketAddrV4;

use tracing::{debug, info};

use super::callbacks::Callbacks;
use super::ccb::{Ccb, ConnId, TcpState};
use super::error::TcpError;
use super::output::send_reset;
use super::stack::TcpStack;
use crate::buf::PacketBuf;
use crate::net::IpLayer;
use crate::wire::{mss_option, TcpFlags};

impl Ccb {
    /// 排一个 FIN 并推进状态；不在可关闭状态时什么也不做。
    pub(crate) fn shutdown(&mut self, seg_room: usize) -> Result<(), TcpError> {
        let next = match self.state {
            TcpState::SynRcvd | TcpState::Established => TcpState::FinWait1,
            TcpState::CloseWait => TcpState::LastAck,
            _ => return Ok(()),
        };
        self.enqueue(PacketBuf::new(), TcpFlags::FIN, Vec::new(), seg_room)?;
        debug!(conn = %self.id, from = %self.state, to = %next, "FIN queued");
        self.state = next;
        Ok(())
    }
}

impl TcpStack {
    fn bind_port(&mut self, local: SocketAddrV4) -> Result<SocketAddrV4, TcpError> {
        if local.port() == 0 {
            let port = self.next_ephemeral_port();
            return Ok(SocketAddrV4::new(*local.ip(), port));
        }
        if self.table.local_in_use(local) {
            debug!(local = %local, "address in use");
            return Err(TcpError::AddrInUse);
        }
        Ok(local)
    }

    /// 主动打开：发出 SYN，进入 SYN_SENT。
    pub fn open_active(
        &mut self,
        local: SocketAddrV4,
        remote: SocketAddrV4,
        callbacks: Callbacks,
        ip: &mut dyn IpLayer,
    ) -> Result<ConnId, TcpError> {
        let local = self.bind_port(local)?;
        let mut ccb = self.alloc_ccb()?;
        ccb.local = local;
        ccb.remote = remote;
        ccb.callbacks = callbacks;
        ccb.cwnd = 1;
        ccb.ssthresh = ccb.mss.saturating_mul(10);
        ccb.state = TcpState::SynSent;

        let room = self.seg_room();
        let opts = mss_option(ccb.mss);
        ccb.enqueue(PacketBuf::new(), TcpFlags::SYN, opts, room)?;
        let mut ctx = Self::ctx(ip, &mut self.stats, self.ticks, room);
        ccb.output(&mut ctx)?;

        info!(conn = %ccb.id, local = %ccb.local, remote = %ccb.remote, "connecting");
        let id = ccb.id;
        self.table.register(ccb);
        Ok(id)
    }

    /// 被动打开：在 `local` 上监听。端口 0 表示分配一个临时端口。
    pub fn open_listen(&mut self, local: SocketAddrV4, callbacks: Callbacks) -> Result<ConnId, TcpError> {
        let local = self.bind_port(local)?;
        let mut ccb = self.alloc_ccb()?;
        ccb.local = local;
        ccb.callbacks = callbacks;
        ccb.state = TcpState::Listen;
        info!(conn = %ccb.id, local = %ccb.local, "listening");
        let id = ccb.id;
        self.table.register(ccb);
        Ok(id)
    }

    /// 复制 `data` 入队并尝试发送。
    pub fn write(&mut self, id: ConnId, data: &[u8], ip: &mut dyn IpLayer) -> Result<(), TcpError> {
        self.write_buf(id, PacketBuf::copy_from_slice(data), ip)
    }

    /// 同 `write`，但直接引用静态数据，不复制。
    pub fn write_static(
        &mut self,
        id: ConnId,
        data: &'static [u8],
        ip: &mut dyn IpLayer,
    ) -> Result<(), TcpError> {
        self.write_buf(id, PacketBuf::from_static(data), ip)
    }

    fn write_buf(&mut self, id: ConnId, data: PacketBuf, ip: &mut dyn IpLayer) -> Result<(), TcpError> {
        let state = self.state(id).ok_or(TcpError::UnknownConnection)?;
        if !matches!(
            state,
            TcpState::SynSent | TcpState::SynRcvd | TcpState::Established | TcpState::CloseWait
        ) {
            debug!(conn = %id, state = %state, "write in wrong state");
            return Err(TcpError::WrongState);
        }
        if data.is_empty() {
            return Ok(());
        }
        self.with_ccb(id, ip, |ccb, ctx| {
            ccb.enqueue(data, TcpFlags::empty(), Vec::new(), ctx.seg_room)?;
            ccb.output(ctx)
        })?
    }

    /// 关闭连接的发送方向。LISTEN 与 SYN_SENT 直接释放。
    pub fn close(&mut self, id: ConnId, ip: &mut dyn IpLayer) -> Result<(), TcpError> {
        let state = self.state(id).ok_or(TcpError::UnknownConnection)?;
        if matches!(state, TcpState::Listen | TcpState::SynSent) {
            if let Some(ccb) = self.table.remove(id) {
                info!(conn = %ccb.id, state = %ccb.state, "closed before connecting");
            }
            return Ok(());
        }
        self.with_ccb(id, ip, |ccb, ctx| {
            ccb.shutdown(ctx.seg_room)?;
            ccb.output(ctx)
        })?
    }

    /// 中止连接：对端收到 RST，本端报告 `Aborted` 后释放。
    pub fn abort(&mut self, id: ConnId, ip: &mut dyn IpLayer) -> Result<(), TcpError> {
        let ccb = self.table.remove(id).ok_or(TcpError::UnknownConnection)?;
        if matches!(ccb.state, TcpState::Listen | TcpState::TimeWait) {
            debug!(conn = %id, state = %ccb.state, "released without reset");
            return Ok(());
        }
        info!(conn = %id, state = %ccb.state, "aborting connection");
        send_reset(ip, &mut self.stats, ccb.snd_nxt, ccb.rcv_nxt, ccb.local, ccb.remote);
        ccb.callbacks.notify_err(id, TcpError::Aborted);
        Ok(())
    }

    /// 应用已取走 `len` 字节。新窗口随下一个（延迟）ACK 通告。
    pub fn recved(&mut self, id: ConnId, len: usize) -> Result<(), TcpError> {
        let ccb = self.table.get_mut(id).ok_or(TcpError::UnknownConnection)?;
        ccb.recved(len);
        Ok(())
    }
}
