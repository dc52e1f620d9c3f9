use crate::buf::PacketBuf;

static TEXT: &[u8] = b"0123456789";

fn chain() -> PacketBuf {
    let mut p = PacketBuf::from_static(TEXT);
    p.append(PacketBuf::copy_from_slice(b"abcdef"));
    p.append(PacketBuf::new());
    p
}

#[test]
fn buf_chain_keeps_order() {
    let p = chain();
    assert_eq!(p.len(), 16);
    assert_eq!(p.chunk_count(), 2);
    assert_eq!(p.to_vec(), b"0123456789abcdef");
}

#[test]
fn buf_trim_front_across_chunks() {
    let mut p = chain();
    p.trim_front(3);
    assert_eq!(p.to_vec(), b"3456789abcdef");
    p.trim_front(9);
    assert_eq!(p.chunk_count(), 1);
    assert_eq!(p.to_vec(), b"cdef");
    p.trim_front(100);
    assert!(p.is_empty());
}

#[test]
fn buf_truncate_and_split() {
    let mut p = chain();
    p.truncate(12);
    assert_eq!(p.to_vec(), b"0123456789ab");

    let mut p = chain();
    let head = p.split_to(4);
    assert_eq!(head.to_vec(), b"0123");
    assert_eq!(p.to_vec(), b"456789abcdef");
    let rest = p.split_to(100);
    assert_eq!(rest.len(), 12);
    assert!(p.is_empty());
}
