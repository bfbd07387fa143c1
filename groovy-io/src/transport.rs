//! Datagram transport to the display device
//!
//! The engine only sees the [`Transport`] trait. Two socket-backed
//! implementations exist: [`UdpTransport`] issues one `send_to` per
//! datagram, [`BatchedTransport`] connects the control socket and hands
//! whole payloads to the kernel in batches with `sendmmsg` where available.
//!
//! Sends are fire-and-forget. A failed send is logged at trace level and
//! dropped; the protocol tolerates lost datagrams.
//!
//! A transport can be closed, which releases its sockets, and reopened to
//! the same addresses with fresh sockets. While closed, sends are dropped
//! and nothing is received.

use crate::socket::{DeviceSocket, SocketError, SEND_BUFFER_SIZE};
use std::net::SocketAddr;

/// Datagrams submitted per `sendmmsg` call
#[cfg(all(target_os = "linux", target_env = "gnu"))]
const MAX_BATCH: usize = 256;

/// Control and input channels to one device
pub trait Transport {
    /// Send one datagram on the control channel
    fn send(&mut self, datagram: &[u8]);

    /// Send `payload` split into datagrams of at most `mtu` bytes
    fn send_stream(&mut self, payload: &[u8], mtu: usize) {
        for chunk in payload.chunks(mtu.max(1)) {
            self.send(chunk);
        }
    }

    /// Read one pending control datagram, if any
    fn try_recv(&mut self, buf: &mut [u8]) -> Option<usize>;

    /// Read one pending input datagram, if any
    fn try_recv_input(&mut self, buf: &mut [u8]) -> Option<usize>;

    /// Release the underlying sockets
    fn close(&mut self) {}

    /// Open fresh sockets after [`close`](Self::close)
    fn reopen(&mut self) -> Result<(), SocketError> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, datagram: &[u8]) {
        (**self).send(datagram)
    }

    fn send_stream(&mut self, payload: &[u8], mtu: usize) {
        (**self).send_stream(payload, mtu)
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> Option<usize> {
        (**self).try_recv(buf)
    }

    fn try_recv_input(&mut self, buf: &mut [u8]) -> Option<usize> {
        (**self).try_recv_input(buf)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn reopen(&mut self) -> Result<(), SocketError> {
        (**self).reopen()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

fn recv_nonblocking(socket: &DeviceSocket, buf: &mut [u8]) -> Option<usize> {
    match socket.recv_from(buf) {
        Ok((n, _)) => Some(n),
        Err(e) if e.is_would_block() => None,
        Err(e) => {
            tracing::trace!("recv failed: {}", e);
            None
        }
    }
}

/// Open the input socket and announce it to the device
///
/// The device learns where to send input from the source address of the
/// first datagram it sees on its input port.
fn open_input(input: SocketAddr) -> Result<DeviceSocket, SocketError> {
    let socket = DeviceSocket::for_peer(input)?;
    socket.send_to(&[0], input)?;
    Ok(socket)
}

/// Plain `send_to` transport
pub struct UdpTransport {
    control: DeviceSocket,
    input: DeviceSocket,
    remote: SocketAddr,
}

impl UdpTransport {
    pub fn open(remote: SocketAddr, input: SocketAddr) -> Result<Self, SocketError> {
        let control = DeviceSocket::for_peer(remote)?;
        control.set_send_buffer_size(SEND_BUFFER_SIZE)?;
        let input_socket = open_input(input)?;

        tracing::debug!("udp transport open to {} (input {})", remote, input);
        Ok(UdpTransport {
            control,
            input: input_socket,
            remote,
        })
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, datagram: &[u8]) {
        if let Err(e) = self.control.send_to(datagram, self.remote) {
            tracing::trace!("send of {} bytes dropped: {}", datagram.len(), e);
        }
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> Option<usize> {
        recv_nonblocking(&self.control, buf)
    }

    fn try_recv_input(&mut self, buf: &mut [u8]) -> Option<usize> {
        recv_nonblocking(&self.input, buf)
    }
}

/// Connected transport submitting streams in batches
pub struct BatchedTransport {
    control: DeviceSocket,
    input: DeviceSocket,
}

impl BatchedTransport {
    pub fn open(remote: SocketAddr, input: SocketAddr) -> Result<Self, SocketError> {
        let control = DeviceSocket::for_peer(remote)?;
        control.set_send_buffer_size(SEND_BUFFER_SIZE)?;
        control.connect(remote)?;
        let input_socket = open_input(input)?;

        tracing::debug!("batched transport open to {} (input {})", remote, input);
        Ok(BatchedTransport {
            control,
            input: input_socket,
        })
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn send_batch(&mut self, payload: &[u8], mtu: usize) {
        use std::os::unix::io::AsRawFd;

        let fd = self.control.as_socket().as_raw_fd();
        let chunks: Vec<&[u8]> = payload.chunks(mtu.max(1)).collect();

        for group in chunks.chunks(MAX_BATCH) {
            let mut iovecs: Vec<libc::iovec> = group
                .iter()
                .map(|chunk| libc::iovec {
                    iov_base: chunk.as_ptr() as *mut libc::c_void,
                    iov_len: chunk.len(),
                })
                .collect();

            let mut messages: Vec<libc::mmsghdr> = iovecs
                .iter_mut()
                .map(|iov| {
                    // SAFETY: msghdr is plain data; all-zero is an empty header
                    let mut header: libc::msghdr = unsafe { std::mem::zeroed() };
                    header.msg_iov = iov as *mut libc::iovec;
                    header.msg_iovlen = 1;
                    libc::mmsghdr {
                        msg_hdr: header,
                        msg_len: 0,
                    }
                })
                .collect();

            let mut sent = 0;
            while sent < messages.len() {
                let remaining = &mut messages[sent..];
                // SAFETY: every header points at an iovec in `iovecs`, which
                // points into `payload`; all outlive the call
                let rc = unsafe {
                    libc::sendmmsg(
                        fd,
                        remaining.as_mut_ptr(),
                        remaining.len() as libc::c_uint,
                        0,
                    )
                };
                if rc <= 0 {
                    tracing::trace!(
                        "sendmmsg dropped {} datagrams: {}",
                        remaining.len(),
                        std::io::Error::last_os_error()
                    );
                    break;
                }
                sent += rc as usize;
            }
        }
    }

    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    fn send_batch(&mut self, payload: &[u8], mtu: usize) {
        for chunk in payload.chunks(mtu.max(1)) {
            self.send(chunk);
        }
    }
}

impl Transport for BatchedTransport {
    fn send(&mut self, datagram: &[u8]) {
        if let Err(e) = self.control.send(datagram) {
            tracing::trace!("send of {} bytes dropped: {}", datagram.len(), e);
        }
    }

    fn send_stream(&mut self, payload: &[u8], mtu: usize) {
        self.send_batch(payload, mtu);
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> Option<usize> {
        recv_nonblocking(&self.control, buf)
    }

    fn try_recv_input(&mut self, buf: &mut [u8]) -> Option<usize> {
        recv_nonblocking(&self.input, buf)
    }
}

enum Link {
    Plain(UdpTransport),
    Batched(BatchedTransport),
}

impl Link {
    fn open(remote: SocketAddr, input: SocketAddr, batched: bool) -> Result<Self, SocketError> {
        if batched {
            Ok(Link::Batched(BatchedTransport::open(remote, input)?))
        } else {
            Ok(Link::Plain(UdpTransport::open(remote, input)?))
        }
    }

    fn transport(&mut self) -> &mut dyn Transport {
        match self {
            Link::Plain(t) => t as &mut dyn Transport,
            Link::Batched(t) => t,
        }
    }
}

/// Socket transport selected at connect time
///
/// Remembers its addresses so a closed transport can be reopened.
pub struct SocketTransport {
    remote: SocketAddr,
    input: SocketAddr,
    batched: bool,
    link: Option<Link>,
}

impl SocketTransport {
    pub fn open(remote: SocketAddr, input: SocketAddr, batched: bool) -> Result<Self, SocketError> {
        Ok(SocketTransport {
            remote,
            input,
            batched,
            link: Some(Link::open(remote, input, batched)?),
        })
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn is_batched(&self) -> bool {
        self.batched
    }
}

impl Transport for SocketTransport {
    fn send(&mut self, datagram: &[u8]) {
        if let Some(link) = self.link.as_mut() {
            link.transport().send(datagram);
        }
    }

    fn send_stream(&mut self, payload: &[u8], mtu: usize) {
        if let Some(link) = self.link.as_mut() {
            link.transport().send_stream(payload, mtu);
        }
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> Option<usize> {
        self.link.as_mut()?.transport().try_recv(buf)
    }

    fn try_recv_input(&mut self, buf: &mut [u8]) -> Option<usize> {
        self.link.as_mut()?.transport().try_recv_input(buf)
    }

    fn close(&mut self) {
        if self.link.take().is_some() {
            tracing::debug!("sockets to {} released", self.remote);
        }
    }

    fn reopen(&mut self) -> Result<(), SocketError> {
        self.link = None;
        self.link = Some(Link::open(self.remote, self.input, self.batched)?);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.link.is_some()
    }
}
