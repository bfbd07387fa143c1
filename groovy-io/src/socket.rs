//! UDP socket wrapper
//!
//! Non-blocking UDP sockets configured for streaming to the display device.

use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, ErrorKind};
use std::mem::MaybeUninit;
use std::net::SocketAddr;
use thiserror::Error;

/// Send buffer requested for the control socket
pub const SEND_BUFFER_SIZE: usize = 2 * 1024 * 1024;

/// Socket configuration errors
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid socket address")]
    InvalidAddress,
}

impl SocketError {
    /// Nothing to read or no room to write right now
    pub fn is_would_block(&self) -> bool {
        matches!(self, SocketError::Io(e) if e.kind() == ErrorKind::WouldBlock)
    }
}

/// Non-blocking UDP socket
pub struct DeviceSocket {
    inner: Socket,
}

impl DeviceSocket {
    /// Create an unbound socket for the address family of `peer`
    pub fn for_peer(peer: SocketAddr) -> Result<Self, SocketError> {
        let domain = if peer.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_nonblocking(true)?;

        Ok(DeviceSocket { inner: socket })
    }

    /// Create a socket bound to the given address
    pub fn bind(addr: SocketAddr) -> Result<Self, SocketError> {
        let socket = Self::for_peer(addr)?;
        socket.inner.set_reuse_address(true)?;
        socket.inner.bind(&addr.into())?;
        Ok(socket)
    }

    /// Fix the default destination so [`send`](Self::send) can be used
    pub fn connect(&self, peer: SocketAddr) -> Result<(), SocketError> {
        self.inner.connect(&peer.into())?;
        Ok(())
    }

    /// Set the send buffer size
    pub fn set_send_buffer_size(&self, size: usize) -> Result<(), SocketError> {
        self.inner.set_send_buffer_size(size)?;
        Ok(())
    }

    /// Get the send buffer size
    pub fn send_buffer_size(&self) -> Result<usize, SocketError> {
        Ok(self.inner.send_buffer_size()?)
    }

    /// Get the local address this socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        self.inner
            .local_addr()?
            .as_socket()
            .ok_or(SocketError::InvalidAddress)
    }

    /// Send data to the given address
    pub fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize, SocketError> {
        Ok(self.inner.send_to(buf, &target.into())?)
    }

    /// Send data to the connected peer
    pub fn send(&self, buf: &[u8]) -> Result<usize, SocketError> {
        Ok(self.inner.send(buf)?)
    }

    /// Receive one datagram
    ///
    /// Returns WouldBlock if nothing is pending.
    pub fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), SocketError> {
        // socket2 takes MaybeUninit; an initialized buffer is a valid one
        let uninit_buf = unsafe {
            std::slice::from_raw_parts_mut(buf.as_mut_ptr() as *mut MaybeUninit<u8>, buf.len())
        };

        let (n, addr) = self.inner.recv_from(uninit_buf)?;
        Ok((n, addr.as_socket().ok_or(SocketError::InvalidAddress)?))
    }

    /// Get a reference to the underlying socket
    pub fn as_socket(&self) -> &Socket {
        &self.inner
    }
}
