//! Internet checksum (RFC 1071) and its ICMPv6 pseudo-header variant.

use std::net::Ipv6Addr;

/// IANA next-header number for ICMPv6, the protocol byte of the
/// pseudo-header.
const IPPROTO_ICMPV6: u8 = 58;

/// One's-complement sum over the buffer as big-endian 16-bit words. An odd
/// trailing byte is folded in as the high byte of a zero-padded word; the
/// carry is folded back twice (the second fold flushes a carry the first
/// one can produce).
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    let mut chunks = data.chunks_exact(2);
    for word in &mut chunks {
        sum += u16::from_be_bytes([word[0], word[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u32) << 8;
    }

    sum = (sum >> 16) + (sum & 0xFFFF);
    sum += sum >> 16;

    !(sum as u16)
}

/// ICMPv6 checksum: the checksum of the pseudo-header (source address,
/// destination address, big-endian payload length, three zero bytes,
/// protocol 58) followed by the ICMP bytes, zero-padded to even length.
/// The pseudo-header is never transmitted.
pub fn checksum_v6(icmp_bytes: &[u8], src: &Ipv6Addr, dst: &Ipv6Addr) -> u16 {
    let mut buf = Vec::with_capacity(40 + icmp_bytes.len() + 1);

    buf.extend_from_slice(&src.octets());
    buf.extend_from_slice(&dst.octets());
    buf.extend_from_slice(&(icmp_bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(&[0, 0, 0, IPPROTO_ICMPV6]);
    buf.extend_from_slice(icmp_bytes);
    if icmp_bytes.len() % 2 != 0 {
        buf.push(0);
    }

    checksum(&buf)
}
