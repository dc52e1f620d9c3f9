//! 线上格式
//!
//! 序列号算术、TCP 头部、Internet 校验和以及承载它们的最小 IPv4 封装。

mod checksum;
mod ipv4;
mod seq;
mod tcp;

pub use checksum::{checksum, checksum_pseudo, finish_pseudo, pseudo_header, Checksum};
pub use ipv4::{encode_datagram, Ipv4Packet, IPV4_HEADER_LEN};
pub use seq::SeqNum;
pub use tcp::{mss_option, parse_mss, TcpFlags, TcpHeader, HEADER_LEN, IP_PROTO_TCP};

/// 解码错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("packet truncated")]
    Truncated,
    #[error("malformed header")]
    Malformed,
    #[error("checksum mismatch")]
    BadChecksum,
    #[error("not a TCP segment")]
    NotTcp,
}
