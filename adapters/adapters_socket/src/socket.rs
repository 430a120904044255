//! Socket Module
//!
//! Owns one OS socket descriptor and issues the lifecycle syscalls on it:
//! socket, bind, listen, connect, accept, socketpair, recvfrom and send.
//! Descriptor handling is delegated to the `socket2` crate; this module
//! adds the error mapping and the non-blocking contract on top.
//!
//! ## Non-blocking mode
//!
//! The `*_nonblock` variants mark the descriptor non-blocking before the
//! call. The mark is one-way for the lifetime of the handle. Instead of
//! blocking they return [`SocketError::Retry`] (or, for connect,
//! [`ConnectOutcome::InProgress`]) and leave waiting to the caller.

use entities_socket::{decode_reported, Address, ArgumentError, PackedAddress, SocketError, SOCKADDR_STORAGE_LEN};
use socket2::{Domain, Protocol, SockAddr, Socket as Socket2, Type};
use std::io;
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};
use tracing::{debug, warn};

const SYS_SOCKET: &str = "socket(2)";
const SYS_SOCKETPAIR: &str = "socketpair(2)";
const SYS_BIND: &str = "bind(2)";
const SYS_LISTEN: &str = "listen(2)";
const SYS_CONNECT: &str = "connect(2)";
const SYS_ACCEPT: &str = "accept(2)";
const SYS_RECVFROM: &str = "recvfrom(2)";
const SYS_SEND: &str = "send(2)";
const SYS_GETSOCKNAME: &str = "getsockname(2)";
const SYS_GETPEERNAME: &str = "getpeername(2)";
const SYS_FCNTL: &str = "fcntl(2)";
const SYS_CLOSE: &str = "close(2)";

// BSD-derived kernels copy O_NONBLOCK from the listener to accepted sockets
const ACCEPT_INHERITS_NONBLOCK: bool = cfg!(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
));

/// Result of a non-blocking connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The connection was established immediately
    Connected,
    /// `EINPROGRESS`: wait for writability, then check the socket error
    InProgress,
}

/// Frees descriptors when the process runs out of them
///
/// Called at most once per [`Socket::pair`] before its single retry.
#[cfg_attr(test, mockall::automock)]
pub trait ResourceReclaimer {
    fn reclaim(&self);
}

/// Reclaimer that frees nothing; the retry then fails the same way
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReclaimer;

impl ResourceReclaimer for NoopReclaimer {
    fn reclaim(&self) {}
}

/// Socket handle
///
/// Exclusively owns its descriptor. Closing consumes the handle, so a
/// closed socket cannot be used again.
#[derive(Debug)]
pub struct Socket {
    inner: Socket2,
    family: i32,
    socket_type: i32,
    protocol: i32,
    nonblocking: bool,
}

impl Socket {
    /// Create a new socket
    ///
    /// # Arguments
    ///
    /// * `family` - Address family (`AF_*`)
    /// * `socket_type` - Socket type (`SOCK_*`)
    /// * `protocol` - Protocol number, 0 for the family default
    ///
    /// # Returns
    ///
    /// * `Ok(Socket)` - Created socket, in blocking mode
    /// * `Err(SocketError)` - `socket(2)` failed
    pub fn new(family: i32, socket_type: i32, protocol: i32) -> Result<Self, SocketError> {
        debug!(family, socket_type, protocol, "socket(2)");
        let inner = Socket2::new(Domain::from(family), Type::from(socket_type), protocol_arg(protocol))
            .map_err(|e| SocketError::from_io(SYS_SOCKET, &e))?;
        Ok(Self::wrap(inner, family, socket_type, protocol, false))
    }

    /// Create a connected pair of sockets
    ///
    /// When the descriptor table is full (`EMFILE`/`ENFILE`) the reclaimer
    /// runs once and the call is retried once.
    ///
    /// # Returns
    ///
    /// * `Ok((Socket, Socket))` - Both ends
    /// * `Err(SocketError)` - `socketpair(2)` failed, after the retry if one applied
    pub fn pair(
        family: i32,
        socket_type: i32,
        protocol: i32,
        reclaimer: &dyn ResourceReclaimer,
    ) -> Result<(Socket, Socket), SocketError> {
        debug!(family, socket_type, protocol, "socketpair(2)");
        let (a, b) = retry_after_reclaim(reclaimer, || {
            Socket2::pair(Domain::from(family), Type::from(socket_type), protocol_arg(protocol))
        })
        .map_err(|e| SocketError::from_io(SYS_SOCKETPAIR, &e))?;
        Ok((
            Self::wrap(a, family, socket_type, protocol, false),
            Self::wrap(b, family, socket_type, protocol, false),
        ))
    }

    fn wrap(inner: Socket2, family: i32, socket_type: i32, protocol: i32, nonblocking: bool) -> Self {
        Self {
            inner,
            family,
            socket_type,
            protocol,
            nonblocking,
        }
    }

    /// Bind socket to an address
    pub fn bind(&self, address: &PackedAddress) -> Result<(), SocketError> {
        let addr = to_sock_addr(address)?;
        debug!(fd = self.as_raw_fd(), len = address.len(), "bind(2)");
        self.inner.bind(&addr).map_err(|e| SocketError::from_io(SYS_BIND, &e))
    }

    /// Listen for incoming connections
    ///
    /// The backlog is passed through untouched; the kernel clamps it.
    pub fn listen(&self, backlog: i32) -> Result<(), SocketError> {
        debug!(fd = self.as_raw_fd(), backlog, "listen(2)");
        self.inner.listen(backlog).map_err(|e| SocketError::from_io(SYS_LISTEN, &e))
    }

    /// Connect to a remote address
    ///
    /// Blocks unless the handle was already marked non-blocking, in which
    /// case `EINPROGRESS` comes back as [`SocketError::Retry`].
    pub fn connect(&self, address: &PackedAddress) -> Result<(), SocketError> {
        let addr = to_sock_addr(address)?;
        debug!(fd = self.as_raw_fd(), nonblocking = self.nonblocking, "connect(2)");
        self.inner
            .connect(&addr)
            .map_err(|e| SocketError::from_io_retryable(SYS_CONNECT, &e))
    }

    /// Mark non-blocking, then connect
    ///
    /// # Returns
    ///
    /// * `Ok(ConnectOutcome::Connected)` - Connected immediately
    /// * `Ok(ConnectOutcome::InProgress)` - Wait for writability
    /// * `Err(SocketError)` - `connect(2)` failed, or `Retry` on `EAGAIN`
    pub fn connect_nonblock(&mut self, address: &PackedAddress) -> Result<ConnectOutcome, SocketError> {
        let addr = to_sock_addr(address)?;
        self.mark_nonblocking()?;
        debug!(fd = self.as_raw_fd(), nonblocking = true, "connect(2)");
        match self.inner.connect(&addr) {
            Ok(()) => Ok(ConnectOutcome::Connected),
            Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => Ok(ConnectOutcome::InProgress),
            Err(e) => Err(SocketError::from_io_retryable(SYS_CONNECT, &e)),
        }
    }

    /// Put the descriptor into non-blocking mode
    ///
    /// There is no way back to blocking mode for this handle.
    pub fn mark_nonblocking(&mut self) -> Result<(), SocketError> {
        if self.nonblocking {
            return Ok(());
        }
        debug!(fd = self.as_raw_fd(), "fcntl(2) O_NONBLOCK");
        self.inner
            .set_nonblocking(true)
            .map_err(|e| SocketError::from_io(SYS_FCNTL, &e))?;
        self.nonblocking = true;
        Ok(())
    }

    /// Accept an incoming connection
    ///
    /// # Returns
    ///
    /// * `Ok((Socket, Option<Address>))` - Connection and peer address, if the kernel reported one
    /// * `Err(SocketError)` - `accept(2)` failed, or `Retry` when nothing is pending
    pub fn accept(&self) -> Result<(Socket, Option<Address>), SocketError> {
        debug!(fd = self.as_raw_fd(), nonblocking = self.nonblocking, "accept(2)");
        let (inner, peer) = self
            .inner
            .accept()
            .map_err(|e| SocketError::from_io_retryable(SYS_ACCEPT, &e))?;
        let peer = sender_address(&peer);
        let socket = Self::wrap(
            inner,
            self.family,
            self.socket_type,
            self.protocol,
            ACCEPT_INHERITS_NONBLOCK && self.nonblocking,
        );
        Ok((socket, peer))
    }

    /// Mark non-blocking, then accept
    pub fn accept_nonblock(&mut self) -> Result<(Socket, Option<Address>), SocketError> {
        self.mark_nonblocking()?;
        self.accept()
    }

    /// Accept, returning the bare descriptor instead of a handle
    pub fn sysaccept(&self) -> Result<(OwnedFd, Option<Address>), SocketError> {
        debug!(fd = self.as_raw_fd(), "accept(2)");
        let (inner, peer) = self
            .inner
            .accept()
            .map_err(|e| SocketError::from_io_retryable(SYS_ACCEPT, &e))?;
        let peer = sender_address(&peer);
        Ok((OwnedFd::from(inner), peer))
    }

    /// Receive up to `max_len` bytes and the sender's address
    ///
    /// An empty result on a stream socket is end-of-file; on a datagram
    /// socket it may equally be an empty datagram.
    ///
    /// # Returns
    ///
    /// * `Ok((Vec<u8>, Option<Address>))` - Data and sender; `None` when the kernel reports no address
    /// * `Err(SocketError)` - `recvfrom(2)` failed, or `Retry` when non-blocking and nothing is queued
    pub fn recvfrom(&self, max_len: usize, flags: i32) -> Result<(Vec<u8>, Option<Address>), SocketError> {
        let mut buf = vec![0u8; max_len];

        // Convert &mut [u8] to &mut [MaybeUninit<u8>]
        let uninit_buf: &mut [MaybeUninit<u8>] =
            unsafe { std::slice::from_raw_parts_mut(buf.as_mut_ptr() as *mut MaybeUninit<u8>, buf.len()) };

        debug!(fd = self.as_raw_fd(), max_len, flags, "recvfrom(2)");
        let (n, from) = self
            .inner
            .recv_from_with_flags(uninit_buf, flags)
            .map_err(|e| SocketError::from_io_retryable(SYS_RECVFROM, &e))?;

        // Safety: the buffer was zero-initialised, recvfrom wrote the first n bytes
        buf.truncate(n);
        Ok((buf, sender_address(&from)))
    }

    /// Mark non-blocking, then receive
    pub fn recvfrom_nonblock(&mut self, max_len: usize, flags: i32) -> Result<(Vec<u8>, Option<Address>), SocketError> {
        self.mark_nonblocking()?;
        self.recvfrom(max_len, flags)
    }

    /// Send data on a connected socket
    pub fn send(&self, data: &[u8], flags: i32) -> Result<usize, SocketError> {
        debug!(fd = self.as_raw_fd(), len = data.len(), flags, "send(2)");
        self.inner
            .send_with_flags(data, flags)
            .map_err(|e| SocketError::from_io_retryable(SYS_SEND, &e))
    }

    /// Local address (`getsockname`)
    pub fn local_address(&self) -> Result<Address, SocketError> {
        let addr = self
            .inner
            .local_addr()
            .map_err(|e| SocketError::from_io(SYS_GETSOCKNAME, &e))?;
        own_address(&addr)
    }

    /// Peer address (`getpeername`)
    pub fn peer_address(&self) -> Result<Address, SocketError> {
        let addr = self
            .inner
            .peer_addr()
            .map_err(|e| SocketError::from_io(SYS_GETPEERNAME, &e))?;
        own_address(&addr)
    }

    /// Close the descriptor, reporting any error from `close(2)`
    pub fn close(self) -> Result<(), SocketError> {
        let fd = self.inner.into_raw_fd();
        debug!(fd, "close(2)");
        // SAFETY: fd was released by the handle and is closed exactly once
        if unsafe { libc::close(fd) } != 0 {
            return Err(SocketError::last_os_error(SYS_CLOSE));
        }
        Ok(())
    }

    /// Get the address family
    pub fn family(&self) -> i32 {
        self.family
    }

    /// Get the socket type
    pub fn socket_type(&self) -> i32 {
        self.socket_type
    }

    /// Get the protocol
    pub fn protocol(&self) -> i32 {
        self.protocol
    }

    /// Whether the handle has been marked non-blocking
    pub fn is_nonblocking(&self) -> bool {
        self.nonblocking
    }

    /// Get the underlying socket2 socket
    pub fn inner(&self) -> &Socket2 {
        &self.inner
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

fn protocol_arg(protocol: i32) -> Option<Protocol> {
    (protocol != 0).then(|| Protocol::from(protocol))
}

fn to_sock_addr(address: &PackedAddress) -> Result<SockAddr, SocketError> {
    let (storage, len) = address.to_storage()?;
    // SAFETY: storage holds len initialised bytes of a socket address
    Ok(unsafe { SockAddr::new(storage, len) })
}

fn sock_addr_bytes(addr: &SockAddr) -> &[u8] {
    // the kernel reports the full address length even when it truncated the copy
    let len = (addr.len() as usize).min(SOCKADDR_STORAGE_LEN);
    // SAFETY: SockAddr owns a sockaddr_storage and len is bounded by its size
    unsafe { std::slice::from_raw_parts(addr.as_ptr() as *const u8, len) }
}

/// Address the kernel reported for a peer; too short to carry a family means none
fn sender_address(addr: &SockAddr) -> Option<Address> {
    decode_reported(sock_addr_bytes(addr))
}

fn own_address(addr: &SockAddr) -> Result<Address, SocketError> {
    sender_address(addr).ok_or_else(|| ArgumentError::InvalidAddress("too short sockaddr".to_string()).into())
}

fn is_descriptor_exhaustion(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::EMFILE) | Some(libc::ENFILE))
}

/// Run `op`; on `EMFILE`/`ENFILE` reclaim once and run it exactly once more
fn retry_after_reclaim<T, F>(reclaimer: &dyn ResourceReclaimer, mut op: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    match op() {
        Err(e) if is_descriptor_exhaustion(&e) => {
            warn!(errno = e.raw_os_error().unwrap_or(0), "descriptor table full, reclaiming before retry");
            reclaimer.reclaim();
            op()
        }
        other => other,
    }
}
