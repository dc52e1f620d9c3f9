//! 传输层协议
//!
//! 目前只有 TCP。

pub mod tcp;
