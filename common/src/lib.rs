use std::{
    fmt,
    net::{IpAddr, SocketAddr, SocketAddrV4, SocketAddrV6, ToSocketAddrs},
    os::unix::io::{AsRawFd, RawFd},
};

use anyhow::{anyhow, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::unix::AsyncFd;

// Strongly typed raw ICMP socket, family chosen by the target address
pub struct IcmpSocket {
    socket: Socket,
    v6: bool,
}

impl IcmpSocket {
    pub fn new(target: IpAddr) -> Result<IcmpSocket> {
        let (socket, v6) = match target {
            IpAddr::V4(_) => (
                Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
                    .map_err(raw_socket_error)?,
                false,
            ),
            IpAddr::V6(_) => (
                Socket::new(Domain::IPV6, Type::RAW, Some(Protocol::ICMPV6))
                    .map_err(raw_socket_error)?,
                true,
            ),
        };
        socket.set_nonblocking(true)?;

        Ok(IcmpSocket { socket, v6 })
    }

    /// Set the outgoing TTL (hop limit on IPv6 sockets). Applied once at
    /// session start, never per probe.
    pub fn set_ttl(&self, ttl: u32) -> Result<()> {
        if self.v6 {
            self.socket.set_unicast_hops_v6(ttl)?;
        } else {
            self.socket.set_ttl(ttl)?;
        }
        Ok(())
    }

    /// Connect the socket to the target so the kernel picks a source
    /// address; `local_addr` then reports the address the ICMPv6
    /// pseudo-header needs.
    pub fn connect(&self, addr: IpAddr) -> Result<()> {
        let addr = sock_addr(addr);
        self.socket.connect(&addr)?;
        Ok(())
    }

    pub fn local_addr(&self) -> Result<IpAddr> {
        let addr = self
            .socket
            .local_addr()?
            .as_socket()
            .ok_or_else(|| anyhow!("socket has no local address"))?;
        Ok(addr.ip())
    }

    pub fn get_ref(&self) -> &Socket {
        &self.socket
    }
}

impl AsRawFd for IcmpSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

fn sock_addr(addr: IpAddr) -> socket2::SockAddr {
    match addr {
        IpAddr::V4(addr) => {
            SocketAddr::V4(SocketAddrV4::new(addr, 0)).into()
        }
        IpAddr::V6(addr) => {
            SocketAddr::V6(SocketAddrV6::new(addr, 0, 0, 0)).into()
        }
    }
}

// Raw sockets need CAP_NET_RAW; turn the bare os error into something
// actionable. Same treatment the ENODEV case gets in bind errors.
fn raw_socket_error(err: std::io::Error) -> std::io::Error {
    if matches!(err.raw_os_error(), Some(libc::EPERM | libc::EACCES)) {
        let error_msg = format!(
            "opening a raw ICMP socket requires elevated privileges (run as \
             root or grant CAP_NET_RAW): {}",
            err
        );
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, error_msg)
    } else {
        err
    }
}

pub struct AsyncIcmpSocket {
    inner: AsyncFd<IcmpSocket>,
}

impl AsyncIcmpSocket {
    pub fn new(socket: IcmpSocket) -> Result<Self> {
        Ok(Self {
            inner: AsyncFd::new(socket)?,
        })
    }

    pub fn get_ref(&self) -> &IcmpSocket {
        self.inner.get_ref()
    }

    pub async fn send_to(
        &mut self,
        packet: &[u8],
        addr: &IpAddr,
    ) -> Result<usize> {
        let addr = sock_addr(*addr);
        loop {
            let mut guard = self.inner.writable().await?;
            match guard.try_io(|inner| {
                inner.get_ref().get_ref().send_to(packet, &addr)
            }) {
                Ok(res) => return Ok(res?),
                Err(_would_block) => continue,
            }
        }
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let mut guard = self.inner.readable().await?;
            // Safety: recv never reads from the buffer, only writes to it
            let uninit_slice = unsafe { core::mem::transmute(&mut *buf) };

            match guard
                .try_io(|inner| inner.get_ref().get_ref().recv(uninit_slice))
            {
                Ok(Ok(n)) => return Ok(n),
                Ok(Err(e)) => Err(anyhow!(e.to_string()))?,
                Err(_would_block) => continue,
            }
        }
    }
}

/// Resolve a host name or address literal to the first address the system
/// resolver returns; the address family of that answer picks the socket
/// domain for the whole session.
pub fn resolve_host(target: &str) -> Result<IpAddr> {
    let addr = (target, 0u16)
        .to_socket_addrs()
        .map_err(|e| anyhow!("failed to resolve `{}`: {}", target, e))?
        .next()
        .ok_or_else(|| anyhow!("no addresses found for `{}`", target))?;

    Ok(addr.ip())
}

/// Running RTT aggregate over received probes (Welford recurrence).
pub struct RttStats {
    mean: f64,
    variance: f64,
    min: f64,
    max: f64,
    samples: usize,
}

impl fmt::Display for RttStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rtt min/avg/max/mdev = {:.3}/{:.3}/{:.3}/{:.3} ms",
            self.min(),
            self.mean(),
            self.max(),
            self.mdev()
        )
    }
}

impl RttStats {
    pub fn new() -> Self {
        Self {
            mean: f64::NAN,
            variance: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
            samples: 0,
        }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }
    pub fn variance(&self) -> f64 {
        self.variance / (self.samples as f64)
    }
    /// Population standard deviation, what ping prints as `mdev`.
    pub fn mdev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn update(&mut self, value: f64) {
        self.samples += 1;
        if self.samples == 1 {
            self.mean = value;
            self.variance = 0.0;
            self.min = value;
            self.max = value;
        } else {
            let old_mean = self.mean;
            self.mean = old_mean + (value - old_mean) / self.samples as f64;
            self.variance =
                self.variance + (value - old_mean) * (value - self.mean);
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
    }
}

impl Default for RttStats {
    fn default() -> Self {
        Self::new()
    }
}
