//! UDP socket wrapper
//!
//! Blocking datagram socket with a read timeout. A receive that times out
//! yields `Ok(None)` rather than an error.

use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use thiserror::Error;

/// Socket errors
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Read timeout must be non-zero")]
    ZeroTimeout,
}

/// Datagram socket
///
/// Configured through socket2, then driven as a standard `UdpSocket`.
#[derive(Debug)]
pub struct DatagramSocket {
    inner: UdpSocket,
}

impl DatagramSocket {
    /// Bind a socket that gives up on each read after `read_timeout`
    pub fn bind(addr: SocketAddr, read_timeout: Duration) -> Result<Self, SocketError> {
        if read_timeout.is_zero() {
            return Err(SocketError::ZeroTimeout);
        }

        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.set_read_timeout(Some(read_timeout))?;

        let inner: UdpSocket = socket.into();
        tracing::debug!(local = ?inner.local_addr().ok(), "Bound datagram socket");
        Ok(DatagramSocket { inner })
    }

    /// Change the per-read timeout
    pub fn set_read_timeout(&self, timeout: Duration) -> Result<(), SocketError> {
        if timeout.is_zero() {
            return Err(SocketError::ZeroTimeout);
        }
        self.inner.set_read_timeout(Some(timeout))?;
        Ok(())
    }

    pub fn read_timeout(&self) -> Result<Option<Duration>, SocketError> {
        Ok(self.inner.read_timeout()?)
    }

    /// Get the local address this socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        Ok(self.inner.local_addr()?)
    }

    /// Send one datagram
    pub fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize, SocketError> {
        Ok(self.inner.send_to(buf, target)?)
    }

    /// Receive one datagram, `None` if the read timeout elapsed first
    pub fn recv_from(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, SocketError> {
        match self.inner.recv_from(buf) {
            Ok((n, addr)) => Ok(Some((n, addr))),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            // ICMP port unreachable from an earlier send, reported on Windows
            Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                tracing::trace!("Ignoring connection reset on datagram socket");
                Ok(None)
            }
            Err(e) => Err(SocketError::Io(e)),
        }
    }
}
