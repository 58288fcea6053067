//! Echo request/reply wire codec.

use std::{fmt, net::Ipv6Addr};

use crate::checksum::{checksum, checksum_v6};

/// Total ICMP wire size of every probe, header included.
pub const PACKET_SIZE: usize = 64;

/// ICMP echo header size (type, code, checksum, identifier, sequence).
pub const ICMP_HEADER_SIZE: usize = 8;

const ECHO_REQUEST_V4: u8 = 8;
const ECHO_REPLY_V4: u8 = 0;
const ECHO_REQUEST_V6: u8 = 128;
const ECHO_REPLY_V6: u8 = 129;

/// Address family of the session, chosen once from the resolved target.
/// The V6 arm carries the addresses the pseudo-header checksum needs.
pub enum PacketFamily {
    V4,
    V6 { src: Ipv6Addr, dst: Ipv6Addr },
}

/// Parsed view of a received echo reply.
#[derive(Debug, PartialEq, Eq)]
pub struct EchoReply {
    pub identifier: u16,
    pub sequence: u16,
}

#[derive(Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes than the fixed wire structure
    TooShort { len: usize },
    /// Not the family-appropriate echo-reply type (covers
    /// destination-unreachable and friends)
    WrongType { icmp_type: u8 },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::TooShort { len } => {
                write!(f, "packet too short: {} bytes", len)
            }
            DecodeError::WrongType { icmp_type } => {
                write!(f, "not an echo reply: icmp type {}", icmp_type)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Build the 64-byte echo request for one probe. The payload is an
/// ascending filler starting at `'0'` with the final byte left 0 as a
/// display terminator; it only exists to pad the packet to its fixed
/// size. The checksum is computed with the field zeroed, then written
/// back.
pub fn build_echo_request(
    sequence: u16,
    identifier: u16,
    family: &PacketFamily,
) -> [u8; PACKET_SIZE] {
    let mut pkt = [0u8; PACKET_SIZE];
    pkt[0] = match family {
        PacketFamily::V4 => ECHO_REQUEST_V4,
        PacketFamily::V6 { .. } => ECHO_REQUEST_V6,
    };
    pkt[4..6].copy_from_slice(&identifier.to_be_bytes());
    pkt[6..8].copy_from_slice(&sequence.to_be_bytes());
    for (i, byte) in
        pkt[ICMP_HEADER_SIZE..PACKET_SIZE - 1].iter_mut().enumerate()
    {
        *byte = b'0'.wrapping_add(i as u8);
    }

    let sum = match family {
        PacketFamily::V4 => checksum(&pkt),
        PacketFamily::V6 { src, dst } => checksum_v6(&pkt, src, dst),
    };
    pkt[2..4].copy_from_slice(&sum.to_be_bytes());
    pkt
}

/// Decode a received buffer (ICMP bytes, any IP header already stripped)
/// as an echo reply. The reply checksum is not re-verified; identifier
/// and sequence are left to the session to match against the outstanding
/// request.
pub fn parse_echo_reply(
    buf: &[u8],
    family: &PacketFamily,
) -> Result<EchoReply, DecodeError> {
    if buf.len() < PACKET_SIZE {
        return Err(DecodeError::TooShort { len: buf.len() });
    }
    let expected = match family {
        PacketFamily::V4 => ECHO_REPLY_V4,
        PacketFamily::V6 { .. } => ECHO_REPLY_V6,
    };
    if buf[0] != expected {
        return Err(DecodeError::WrongType { icmp_type: buf[0] });
    }

    Ok(EchoReply {
        identifier: u16::from_be_bytes([buf[4], buf[5]]),
        sequence: u16::from_be_bytes([buf[6], buf[7]]),
    })
}

/// Post-incrementing probe sequence counter, starting at 0.
pub struct Sequence(u16);

impl Sequence {
    pub fn new() -> Self {
        Sequence(0)
    }

    pub fn next(&mut self) -> u16 {
        let seq = self.0;
        self.0 = self.0.wrapping_add(1);
        seq
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}
