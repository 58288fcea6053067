use std::{
    net::IpAddr,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Result};
use common::{AsyncIcmpSocket, IcmpSocket};
use tokio::time;

use crate::{
    cancel::CancelToken,
    packet::{self, PacketFamily, Sequence, PACKET_SIZE},
    stats::{ProbeOutcome, SessionStats},
};

/// Fixed inter-probe delay; the only pacing there is.
const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Max incoming packet size.
const MAX_RECV_BUF_LEN: usize = 0xFFFF;

/// One ping session: owns the socket and drives the serial
/// build/send/await/record round-trip until cancelled, then prints the
/// summary. One probe in flight at a time; a reply is only ever matched
/// against the most recently sent request.
pub struct EchoSession {
    /// ICMP socket, raw, family fixed at creation
    socket: AsyncIcmpSocket,
    /// Destination IP address
    dst_addr: IpAddr,
    /// Address family tag, carries the v6 pseudo-header addresses
    family: PacketFamily,
    /// Identifier stamped into every probe of this session
    identifier: u16,
    /// Probe sequence counter
    sequence: Sequence,
    /// Configured TTL, applied to the socket once at start
    ttl: u32,
    /// Per-probe receive timeout
    timeout: Duration,
    /// Transmitted/received accounting
    stats: SessionStats,
    /// Stop flag, polled between probes
    cancel: CancelToken,
}

impl EchoSession {
    pub fn new(
        target: &str,
        dst_addr: IpAddr,
        ttl: u32,
        timeout: Duration,
        cancel: CancelToken,
    ) -> Result<EchoSession> {
        let socket = IcmpSocket::new(dst_addr)?;
        socket.set_ttl(ttl)?;

        let family = match dst_addr {
            IpAddr::V4(_) => PacketFamily::V4,
            IpAddr::V6(dst) => {
                // Connecting makes the kernel pick a source address, which
                // the pseudo-header checksum needs
                socket.connect(dst_addr)?;
                let src = match socket.local_addr()? {
                    IpAddr::V6(src) => src,
                    IpAddr::V4(_) => {
                        return Err(anyhow!(
                            "IPv6 socket reported an IPv4 local address"
                        ));
                    }
                };
                PacketFamily::V6 { src, dst }
            }
        };

        Ok(EchoSession {
            socket: AsyncIcmpSocket::new(socket)?,
            dst_addr,
            family,
            identifier: rand::random::<u16>(),
            sequence: Sequence::new(),
            ttl,
            timeout,
            stats: SessionStats::new(target, &dst_addr.to_string()),
            cancel,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        println!(
            "Pinging {} ({}) with {} bytes of data",
            self.stats.target_display_name,
            self.stats.target_numeric_address,
            PACKET_SIZE
        );

        let mut buf = [0u8; MAX_RECV_BUF_LEN];
        while !self.cancel.is_cancelled() {
            time::sleep(PROBE_INTERVAL).await;
            // An interrupt during the delay skips the next probe
            if self.cancel.is_cancelled() {
                break;
            }
            let outcome = self.probe_once(&mut buf).await;
            self.stats.record(outcome);
        }

        println!("{}", self.stats.render(self.stats.started_at.elapsed()));
        Ok(())
    }

    /// One full round-trip: build, send, await a matching reply under the
    /// configured timeout. Anything that is not an acceptable reply is a
    /// loss for this probe; there is no retry within a probe.
    async fn probe_once(&mut self, buf: &mut [u8]) -> ProbeOutcome {
        let seq = self.sequence.next();
        let request =
            packet::build_echo_request(seq, self.identifier, &self.family);

        let started = Instant::now();
        if let Err(e) = self.socket.send_to(&request, &self.dst_addr).await {
            println!("Failed to send probe icmp_seq={}: {}", seq, e);
            return ProbeOutcome::SendFailed;
        }

        let len = match time::timeout(self.timeout, self.socket.read(buf))
            .await
        {
            Err(_elapsed) => {
                println!("Request timeout for icmp_seq={}", seq);
                return ProbeOutcome::TimedOut;
            }
            Ok(Err(e)) => {
                println!("Failed to receive icmp_seq={}: {}", seq, e);
                return ProbeOutcome::TimedOut;
            }
            Ok(Ok(len)) => len,
        };
        let rtt = started.elapsed();

        // Raw ICMPv4 sockets hand us the IP header as well; ICMPv6 ones
        // deliver the ICMP bytes directly
        let icmp = match self.family {
            PacketFamily::V4 => match strip_ipv4_header(&buf[..len]) {
                Some(icmp) => icmp,
                None => {
                    println!("Received truncated datagram ({} bytes)", len);
                    return ProbeOutcome::TimedOut;
                }
            },
            PacketFamily::V6 { .. } => &buf[..len],
        };

        let reply = match packet::parse_echo_reply(icmp, &self.family) {
            Ok(reply) => reply,
            Err(e) => {
                println!("Discarding packet: {}", e);
                return ProbeOutcome::TimedOut;
            }
        };
        if reply.identifier != self.identifier || reply.sequence != seq {
            println!(
                "Received reply, but not our probe (id={} seq={})",
                reply.identifier, reply.sequence
            );
            return ProbeOutcome::TimedOut;
        }

        println!(
            "{} bytes from {} ({}): icmp_seq={} ttl={} time={:.3} ms",
            icmp.len(),
            self.stats.target_display_name,
            self.stats.target_numeric_address,
            seq,
            self.ttl,
            rtt.as_secs_f64() * 1e3
        );
        ProbeOutcome::Received(rtt)
    }
}

/// Skip the IPv4 header by its IHL field. None if the datagram is shorter
/// than its own claimed header.
fn strip_ipv4_header(datagram: &[u8]) -> Option<&[u8]> {
    let ihl = (*datagram.first()? & 0x0f) as usize * 4;
    if ihl < 20 || datagram.len() <= ihl {
        return None;
    }
    Some(&datagram[ihl..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_plain_header() {
        let mut datagram = vec![0u8; 20 + 64];
        datagram[0] = 0x45; // version 4, IHL 5
        datagram[20] = 0xaa;
        let icmp = strip_ipv4_header(&datagram).unwrap();
        assert_eq!(icmp.len(), 64);
        assert_eq!(icmp[0], 0xaa);
    }

    #[test]
    fn strip_header_with_options() {
        let mut datagram = vec![0u8; 24 + 64];
        datagram[0] = 0x46; // IHL 6, one option word
        datagram[24] = 0xbb;
        let icmp = strip_ipv4_header(&datagram).unwrap();
        assert_eq!(icmp[0], 0xbb);
    }

    #[test]
    fn strip_rejects_truncated() {
        assert!(strip_ipv4_header(&[]).is_none());
        let mut datagram = vec![0u8; 20];
        datagram[0] = 0x45; // header only, no ICMP bytes
        assert!(strip_ipv4_header(&datagram).is_none());
    }

    #[test]
    fn strip_rejects_bogus_ihl() {
        let mut datagram = vec![0u8; 64];
        datagram[0] = 0x41; // IHL 1, below the minimum of 5
        assert!(strip_ipv4_header(&datagram).is_none());
    }
}
