//! 可链接的数据缓冲区
//!
//! `PacketBuf` 是若干字节块组成的链。拷贝写入的数据以 `Owned` 块保存，
//! 零拷贝写入（`&'static [u8]`）以 `Borrowed` 块引用原数据。交给 IP 层
//! 或应用之后，所有权随值一起移交。

use std::borrow::Cow;
use std::collections::VecDeque;

#[derive(Debug, Clone, Default)]
pub struct PacketBuf {
    chunks: VecDeque<Cow<'static, [u8]>>,
    len: usize,
}

impl PacketBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(v: Vec<u8>) -> Self {
        let mut b = Self::new();
        b.push_chunk(Cow::Owned(v));
        b
    }

    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self::from_vec(data.to_vec())
    }

    pub fn from_static(data: &'static [u8]) -> Self {
        let mut b = Self::new();
        b.push_chunk(Cow::Borrowed(data));
        b
    }

    fn push_chunk(&mut self, chunk: Cow<'static, [u8]>) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push_back(chunk);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.chunks.iter().map(|c| c.as_ref())
    }

    /// 把 `other` 链到末尾。
    pub fn append(&mut self, other: PacketBuf) {
        for c in other.chunks {
            self.push_chunk(c);
        }
    }

    /// 丢弃前 `n` 个字节。
    pub fn trim_front(&mut self, mut n: usize) {
        n = n.min(self.len);
        self.len -= n;
        while n > 0 {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };
            if front.len() <= n {
                n -= front.len();
                self.chunks.pop_front();
                continue;
            }
            match front {
                Cow::Borrowed(s) => {
                    let whole: &'static [u8] = *s;
                    *s = &whole[n..];
                }
                Cow::Owned(v) => {
                    v.drain(..n);
                }
            }
            n = 0;
        }
    }

    /// 只保留前 `n` 个字节。
    pub fn truncate(&mut self, n: usize) {
        if n >= self.len {
            return;
        }
        let mut keep = n;
        let mut kept = VecDeque::new();
        while let Some(mut c) = self.chunks.pop_front() {
            if keep == 0 {
                break;
            }
            if c.len() > keep {
                match &mut c {
                    Cow::Borrowed(s) => {
                        let whole: &'static [u8] = *s;
                        *s = &whole[..keep];
                    }
                    Cow::Owned(v) => v.truncate(keep),
                }
            }
            keep -= c.len();
            kept.push_back(c);
        }
        self.chunks = kept;
        self.len = n;
    }

    /// 拆出前 `n` 个字节，余下的留在 `self`。
    pub fn split_to(&mut self, n: usize) -> PacketBuf {
        let n = n.min(self.len);
        let mut head = PacketBuf::new();
        while head.len < n {
            let Some(c) = self.chunks.pop_front() else {
                break;
            };
            let need = n - head.len;
            if c.len() <= need {
                self.len -= c.len();
                head.push_chunk(c);
                continue;
            }
            let (front, back) = match c {
                Cow::Borrowed(s) => (Cow::Borrowed(&s[..need]), Cow::Borrowed(&s[need..])),
                Cow::Owned(mut v) => {
                    let rest = v.split_off(need);
                    (Cow::Owned(v), Cow::Owned(rest))
                }
            };
            self.len -= need;
            head.push_chunk(front);
            self.chunks.push_front(back);
        }
        head
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for c in &self.chunks {
            out.extend_from_slice(c);
        }
        out
    }
}

impl From<Vec<u8>> for PacketBuf {
    fn from(v: Vec<u8>) -> Self {
        PacketBuf::from_vec(v)
    }
}
