//! TCP 报文头
//!
//! 定长 20 字节头部 + 选项。字段按网络字节序读写，不做任何裸指针偏移。

use std::net::Ipv4Addr;

use bitflags::bitflags;
use byteorder::{ByteOrder, NetworkEndian};

use super::checksum::{finish_pseudo, Checksum};
use super::seq::SeqNum;
use super::WireError;

/// IP 协议号
pub const IP_PROTO_TCP: u8 = 6;

/// 不含选项的头部长度
pub const HEADER_LEN: usize = 20;

mod field {
    use std::ops::Range;

    pub const SRC_PORT: Range<usize> = 0..2;
    pub const DST_PORT: Range<usize> = 2..4;
    pub const SEQ_NUM: Range<usize> = 4..8;
    pub const ACK_NUM: Range<usize> = 8..12;
    pub const OFFSET: usize = 12;
    pub const FLAGS: usize = 13;
    pub const WIN_SIZE: Range<usize> = 14..16;
    pub const CHECKSUM: Range<usize> = 16..18;
    pub const URGENT: Range<usize> = 18..20;

    pub const OPT_END: u8 = 0x00;
    pub const OPT_NOP: u8 = 0x01;
    pub const OPT_MSS: u8 = 0x02;
}

bitflags! {
    /// 控制位
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TcpFlags: u8 {
        const FIN = 0x01;
        const SYN = 0x02;
        const RST = 0x04;
        const PSH = 0x08;
        const ACK = 0x10;
        const URG = 0x20;
    }
}

/// 解码后的 TCP 头部。
///
/// `options` 保存原始选项字节；发送时补零到 4 字节对齐。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: SeqNum,
    pub ack: SeqNum,
    pub flags: TcpFlags,
    pub wnd: u16,
    pub checksum: u16,
    pub urgent: u16,
    pub options: Vec<u8>,
}

impl TcpHeader {
    /// 头部长度（含对齐后的选项）
    pub fn header_len(&self) -> usize {
        HEADER_LEN + self.options.len().div_ceil(4) * 4
    }

    /// 解析一个 TCP 段，返回头部和数据起始偏移。
    pub fn parse(bytes: &[u8]) -> Result<(TcpHeader, usize), WireError> {
        if bytes.len() < HEADER_LEN {
            return Err(WireError::Truncated);
        }
        let hdr_len = ((bytes[field::OFFSET] >> 4) as usize) * 4;
        if hdr_len < HEADER_LEN {
            return Err(WireError::Malformed);
        }
        if hdr_len > bytes.len() {
            return Err(WireError::Truncated);
        }

        let hdr = TcpHeader {
            src_port: NetworkEndian::read_u16(&bytes[field::SRC_PORT]),
            dst_port: NetworkEndian::read_u16(&bytes[field::DST_PORT]),
            seq: SeqNum(NetworkEndian::read_u32(&bytes[field::SEQ_NUM])),
            ack: SeqNum(NetworkEndian::read_u32(&bytes[field::ACK_NUM])),
            flags: TcpFlags::from_bits_truncate(bytes[field::FLAGS]),
            wnd: NetworkEndian::read_u16(&bytes[field::WIN_SIZE]),
            checksum: NetworkEndian::read_u16(&bytes[field::CHECKSUM]),
            urgent: NetworkEndian::read_u16(&bytes[field::URGENT]),
            options: bytes[HEADER_LEN..hdr_len].to_vec(),
        };
        Ok((hdr, hdr_len))
    }

    /// 编码头部（使用当前 `checksum` 字段）。
    pub fn emit(&self, out: &mut Vec<u8>) {
        let start = out.len();
        let hdr_len = self.header_len();
        out.resize(start + hdr_len, 0);
        let b = &mut out[start..];
        NetworkEndian::write_u16(&mut b[field::SRC_PORT], self.src_port);
        NetworkEndian::write_u16(&mut b[field::DST_PORT], self.dst_port);
        NetworkEndian::write_u32(&mut b[field::SEQ_NUM], self.seq.0);
        NetworkEndian::write_u32(&mut b[field::ACK_NUM], self.ack.0);
        b[field::OFFSET] = ((hdr_len / 4) as u8) << 4;
        b[field::FLAGS] = self.flags.bits();
        NetworkEndian::write_u16(&mut b[field::WIN_SIZE], self.wnd);
        NetworkEndian::write_u16(&mut b[field::CHECKSUM], self.checksum);
        NetworkEndian::write_u16(&mut b[field::URGENT], self.urgent);
        b[HEADER_LEN..HEADER_LEN + self.options.len()].copy_from_slice(&self.options);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header_len());
        self.emit(&mut out);
        out
    }

    /// 计算校验和（忽略当前 `checksum` 字段）。
    pub fn compute_checksum<'a, I>(&self, payload: I, src: Ipv4Addr, dst: Ipv4Addr) -> u16
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut zeroed = self.clone();
        zeroed.checksum = 0;
        let hdr = zeroed.to_bytes();
        let mut body = Checksum::new();
        body.add_bytes(&hdr);
        let mut len = hdr.len();
        for chunk in payload {
            len += chunk.len();
            body.add_bytes(chunk);
        }
        finish_pseudo(&body, len, src, dst, IP_PROTO_TCP)
    }

    /// 重新计算并写入校验和。
    pub fn fill_checksum<'a, I>(&mut self, payload: I, src: Ipv4Addr, dst: Ipv4Addr)
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        self.checksum = self.compute_checksum(payload, src, dst);
    }

    /// 对端通告的 MSS（若存在）。
    pub fn mss(&self) -> Option<u16> {
        parse_mss(&self.options)
    }
}

/// 扫描选项寻找 MSS。
///
/// END 结束扫描，NOP 跳过一个字节，长度为 4 的 MSS 选项被取出后停止；
/// 其他选项按长度字段跳过，长度为 0 或越界视为畸形并停止。
pub fn parse_mss(opts: &[u8]) -> Option<u16> {
    let mut c = 0;
    while c < opts.len() {
        match opts[c] {
            field::OPT_END => break,
            field::OPT_NOP => c += 1,
            kind => {
                let len = *opts.get(c + 1)? as usize;
                if kind == field::OPT_MSS && len == 4 {
                    let value = opts.get(c + 2..c + 4)?;
                    return Some(NetworkEndian::read_u16(value));
                }
                if len == 0 {
                    break;
                }
                c += len;
            }
        }
    }
    None
}

/// 构造 MSS 选项：kind=2, len=4, 16 位数值。
pub fn mss_option(mss: u16) -> Vec<u8> {
    let [hi, lo] = mss.to_be_bytes();
    vec![field::OPT_MSS, 4, hi, lo]
}
