//! RFC 1071 校验和，可分块累加。

use std::net::Ipv4Addr;

use byteorder::{ByteOrder, NetworkEndian};

/// 反码累加器。
///
/// 数据可以任意切块送入；奇数长度块的最后一个字节暂存，与下一块的首字节
/// 拼成一个字，结果与对整段拼接后求和相同。
#[derive(Debug, Clone, Default)]
pub struct Checksum {
    acc: u64,
    odd: Option<u8>,
}

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bytes(&mut self, mut data: &[u8]) {
        if let Some(hi) = self.odd.take() {
            match data.split_first() {
                Some((&lo, rest)) => {
                    self.acc += u16::from_be_bytes([hi, lo]) as u64;
                    data = rest;
                }
                None => {
                    self.odd = Some(hi);
                    return;
                }
            }
        }

        let mut words = data.chunks_exact(2);
        for w in &mut words {
            self.acc += NetworkEndian::read_u16(w) as u64;
        }
        if let [last] = words.remainder() {
            self.odd = Some(*last);
        }
    }

    pub fn add_u16(&mut self, word: u16) {
        self.add_bytes(&word.to_be_bytes());
    }

    /// 折叠后的和，不取反。暂存的奇字节补零。
    pub fn fold(&self) -> u16 {
        let mut acc = self.acc;
        if let Some(hi) = self.odd {
            acc += (hi as u64) << 8;
        }
        while acc >> 16 != 0 {
            acc = (acc & 0xffff) + (acc >> 16);
        }
        acc as u16
    }

    /// 取反后的校验和，可直接写入头部。
    pub fn finish(&self) -> u16 {
        !self.fold()
    }
}

/// 以 IPv4 伪首部开始累加。
pub fn pseudo_header(src: Ipv4Addr, dst: Ipv4Addr, proto: u8, len: u16) -> Checksum {
    let mut c = Checksum::new();
    c.add_bytes(&src.octets());
    c.add_bytes(&dst.octets());
    c.add_u16(proto as u16);
    c.add_u16(len);
    c
}

/// 带伪首部的校验和，`chunks` 依次是头部与数据。
///
/// 对校验和字段正确的报文段结果为 0。
pub fn checksum_pseudo<'a, I>(chunks: I, src: Ipv4Addr, dst: Ipv4Addr, proto: u8) -> u16
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut body = Checksum::new();
    let mut len = 0usize;
    for chunk in chunks {
        len += chunk.len();
        body.add_bytes(chunk);
    }
    finish_pseudo(&body, len, src, dst, proto)
}

/// 把已累加的报文段 `body`（共 `len` 字节）并入伪首部并取反。
pub fn finish_pseudo(body: &Checksum, len: usize, src: Ipv4Addr, dst: Ipv4Addr, proto: u8) -> u16 {
    let mut c = pseudo_header(src, dst, proto, len as u16);
    c.add_u16(body.fold());
    c.finish()
}

/// 单块数据的普通校验和（IPv4 头部用）。
pub fn checksum(data: &[u8]) -> u16 {
    let mut c = Checksum::new();
    c.add_bytes(data);
    c.finish()
}
