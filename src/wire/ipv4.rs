//! 最小 IPv4 数据报编解码（无选项、无分片）。

use std::net::Ipv4Addr;

use byteorder::{ByteOrder, NetworkEndian};

use super::checksum::checksum;
use super::WireError;

pub const IPV4_HEADER_LEN: usize = 20;
const DEFAULT_TTL: u8 = 64;

/// 解析后的 IPv4 数据报视图，`payload` 按总长度截断。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Packet<'a> {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub proto: u8,
    pub payload: &'a [u8],
}

impl<'a> Ipv4Packet<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, WireError> {
        if bytes.len() < IPV4_HEADER_LEN {
            return Err(WireError::Truncated);
        }
        if bytes[0] >> 4 != 4 {
            return Err(WireError::Malformed);
        }
        let ihl = ((bytes[0] & 0x0f) as usize) * 4;
        let total = NetworkEndian::read_u16(&bytes[2..4]) as usize;
        if ihl < IPV4_HEADER_LEN || total < ihl {
            return Err(WireError::Malformed);
        }
        if total > bytes.len() {
            return Err(WireError::Truncated);
        }
        if checksum(&bytes[..ihl]) != 0 {
            return Err(WireError::BadChecksum);
        }
        Ok(Ipv4Packet {
            src: Ipv4Addr::from(NetworkEndian::read_u32(&bytes[12..16])),
            dst: Ipv4Addr::from(NetworkEndian::read_u32(&bytes[16..20])),
            proto: bytes[9],
            payload: &bytes[ihl..total],
        })
    }
}

/// 在 `payload` 前加上 IPv4 头部。
pub fn encode_datagram(src: Ipv4Addr, dst: Ipv4Addr, proto: u8, ident: u16, payload: &[u8]) -> Vec<u8> {
    let total = IPV4_HEADER_LEN + payload.len();
    let mut out = vec![0u8; IPV4_HEADER_LEN];
    out[0] = 0x45;
    NetworkEndian::write_u16(&mut out[2..4], total as u16);
    NetworkEndian::write_u16(&mut out[4..6], ident);
    out[8] = DEFAULT_TTL;
    out[9] = proto;
    out[12..16].copy_from_slice(&src.octets());
    out[16..20].copy_from_slice(&dst.octets());
    let sum = checksum(&out);
    NetworkEndian::write_u16(&mut out[10..12], sum);
    out.extend_from_slice(payload);
    out
}
