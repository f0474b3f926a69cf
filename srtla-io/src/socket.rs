//! UDP socket wrapper for the bonding transport
//!
//! Provides a cross-platform nonblocking UDP socket abstraction. Outbound
//! link sockets are connected to the bonding server and may be pinned to a
//! specific network interface so each physical path really leaves through
//! its own uplink.

use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use thiserror::Error;

/// Socket configuration errors
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid socket address")]
    InvalidAddress,

    #[error("Binding to a specific interface is not supported on this platform")]
    UnsupportedOption,
}

impl SocketError {
    /// Check whether the error is a nonblocking would-block condition
    pub fn is_would_block(&self) -> bool {
        matches!(self, SocketError::Io(e) if e.kind() == ErrorKind::WouldBlock)
    }
}

/// Nonblocking UDP socket for one physical link or local bridge endpoint
pub struct LinkSocket {
    inner: Socket,
}

impl LinkSocket {
    /// Create a socket connected to the given remote address
    ///
    /// If `interface` is given, the socket is bound to that network device so
    /// traffic uses the corresponding path instead of the default route.
    pub fn connect(remote: SocketAddr, interface: Option<&str>) -> Result<Self, SocketError> {
        let domain = if remote.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

        if let Some(name) = interface {
            bind_device(&socket, name)?;
        }

        socket.set_nonblocking(true)?;
        socket.connect(&remote.into())?;

        Ok(LinkSocket { inner: socket })
    }

    /// Create a socket bound to the given local address
    pub fn bind(addr: SocketAddr) -> Result<Self, SocketError> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.set_nonblocking(true)?;

        Ok(LinkSocket { inner: socket })
    }

    /// Set the send buffer size
    pub fn set_send_buffer_size(&self, size: usize) -> Result<(), SocketError> {
        self.inner.set_send_buffer_size(size)?;
        Ok(())
    }

    /// Set the receive buffer size
    pub fn set_recv_buffer_size(&self, size: usize) -> Result<(), SocketError> {
        self.inner.set_recv_buffer_size(size)?;
        Ok(())
    }

    /// Get the local address this socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        self.inner
            .local_addr()?
            .as_socket()
            .ok_or(SocketError::InvalidAddress)
    }

    /// Send data to the connected peer
    pub fn send(&self, buf: &[u8]) -> Result<usize, SocketError> {
        Ok(self.inner.send(buf)?)
    }

    /// Send data to the given address
    pub fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize, SocketError> {
        Ok(self.inner.send_to(buf, &target.into())?)
    }

    /// Receive data from the connected peer
    ///
    /// Returns the number of bytes received, or a WouldBlock error if the
    /// socket is not ready.
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize, SocketError> {
        // socket2 recv needs MaybeUninit; reuse the caller's buffer in place
        use std::mem::MaybeUninit;
        let uninit_buf = unsafe {
            std::slice::from_raw_parts_mut(buf.as_mut_ptr() as *mut MaybeUninit<u8>, buf.len())
        };

        Ok(self.inner.recv(uninit_buf)?)
    }

    /// Receive data and the source address
    pub fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), SocketError> {
        use std::mem::MaybeUninit;
        let uninit_buf = unsafe {
            std::slice::from_raw_parts_mut(buf.as_mut_ptr() as *mut MaybeUninit<u8>, buf.len())
        };

        match self.inner.recv_from(uninit_buf) {
            Ok((n, addr)) => Ok((n, addr.as_socket().ok_or(SocketError::InvalidAddress)?)),
            Err(e) => Err(SocketError::Io(e)),
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn bind_device(socket: &Socket, name: &str) -> Result<(), SocketError> {
    socket.bind_device(Some(name.as_bytes()))?;
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn bind_device(_socket: &Socket, name: &str) -> Result<(), SocketError> {
    tracing::warn!("Cannot bind to interface {} on this platform", name);
    Err(SocketError::UnsupportedOption)
}
