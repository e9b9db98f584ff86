//! Non-blocking stream and datagram sockets with send/receive queues.
//!
//! A [`NetworkSocket`] never blocks and never waits: every operation either
//! completes, reports [`SocketStatus::Retry`] when the kernel would block, or
//! fails with a [`ProxyError`]. Readiness polling is the caller's business;
//! [`NetworkSocket::raw_fd`] exposes the descriptor for that.
//!
//! The descriptor is created lazily by `bind()`, `connect()` or the first
//! datagram `write()`, because the address family is only known once an
//! address has been set.

use std::io::{self, IoSlice};
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, RawFd};

use bytes::BytesMut;
use socket2::{Domain, Protocol, Socket, Type};
use sqlproxy_error::{ProxyError, Result};
use tracing::{debug, trace, warn};

use crate::address::NetworkAddress;
use crate::config::NetworkConfig;
use crate::queue::NetworkQueue;

/// Outcome of a non-fatal socket operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum SocketStatus {
    /// The operation completed.
    Success,
    /// The kernel would block; call again once the descriptor is ready.
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Stream,
    Datagram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Unbound,
    Bound,
    Listening,
    Connecting,
    Connected,
    Closed,
}

impl SocketState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unbound => "unbound",
            Self::Bound => "bound",
            Self::Listening => "listening",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SocketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A socket endpoint owning its descriptor and both byte queues.
#[derive(Debug)]
pub struct NetworkSocket {
    handle: Option<Socket>,
    kind: SocketKind,
    state: SocketState,
    src: NetworkAddress,
    dst: NetworkAddress,
    send_queue: NetworkQueue,
    recv_queue: NetworkQueue,
    to_read: usize,
    /// Set by `to_read()` once a stream reports end of file.
    peer_closed: bool,
    config: NetworkConfig,
}

impl Default for NetworkSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkSocket {
    /// A stream socket with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SocketKind::Stream, NetworkConfig::default())
    }

    /// A datagram socket with the default configuration.
    #[must_use]
    pub fn new_datagram() -> Self {
        Self::with_config(SocketKind::Datagram, NetworkConfig::default())
    }

    #[must_use]
    pub fn with_config(kind: SocketKind, config: NetworkConfig) -> Self {
        Self {
            handle: None,
            kind,
            state: SocketState::Unbound,
            src: NetworkAddress::new(),
            dst: NetworkAddress::new(),
            send_queue: NetworkQueue::new(),
            recv_queue: NetworkQueue::new(),
            to_read: 0,
            peer_closed: false,
            config,
        }
    }

    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Local endpoint.
    pub fn src(&self) -> &NetworkAddress {
        &self.src
    }

    pub fn src_mut(&mut self) -> &mut NetworkAddress {
        &mut self.src
    }

    /// Remote endpoint.
    pub fn dst(&self) -> &NetworkAddress {
        &self.dst
    }

    pub fn dst_mut(&mut self) -> &mut NetworkAddress {
        &mut self.dst
    }

    pub fn send_queue(&self) -> &NetworkQueue {
        &self.send_queue
    }

    pub fn send_queue_mut(&mut self) -> &mut NetworkQueue {
        &mut self.send_queue
    }

    pub fn recv_queue(&self) -> &NetworkQueue {
        &self.recv_queue
    }

    pub fn recv_queue_mut(&mut self) -> &mut NetworkQueue {
        &mut self.recv_queue
    }

    /// Byte count cached by the last [`to_read`](Self::to_read) call, minus
    /// what has been read since.
    pub fn to_read_count(&self) -> usize {
        self.to_read
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        self.handle.as_ref().map(AsRawFd::as_raw_fd)
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Bind to `src` and start listening if this is a stream socket.
    ///
    /// A stream socket with only `dst` set listens on `dst`. Either way the
    /// address the kernel bound is recorded in `src`.
    pub fn bind(&mut self) -> Result<SocketStatus> {
        let target = if self.src.is_set() {
            &self.src
        } else if self.kind == SocketKind::Stream && self.dst.is_set() {
            &self.dst
        } else {
            return Err(ProxyError::NoAddress { op: "bind" });
        };
        let unix = target.is_unix();
        let addr = target.to_sock_addr("bind")?;
        self.expect_state("bind", &[SocketState::Unbound])?;
        let socket = new_handle(self.kind, addr.domain())?;

        if !unix {
            socket.set_reuse_address(true)?;
        }
        socket.bind(&addr)?;
        if self.kind == SocketKind::Stream {
            socket.listen(self.config.listen_backlog())?;
        }
        let local = socket.local_addr()?;
        let fd = socket.as_raw_fd();

        self.handle = Some(socket);
        self.src.refresh_from(&local);
        self.state = match self.kind {
            SocketKind::Stream => SocketState::Listening,
            SocketKind::Datagram => SocketState::Bound,
        };
        debug!(fd, addr = %self.src, state = %self.state, "socket bound");
        Ok(SocketStatus::Success)
    }

    /// Start connecting a stream socket to `dst`.
    pub fn connect(&mut self) -> Result<SocketStatus> {
        if self.kind != SocketKind::Stream {
            return Err(self.invalid("connect"));
        }
        self.expect_state("connect", &[SocketState::Unbound])?;
        let addr = self.dst.to_sock_addr("connect")?;
        let socket = new_handle(self.kind, addr.domain())?;
        if self.config.tcp_nodelay && !self.dst.is_unix() {
            socket.set_nodelay(true)?;
        }

        let result = socket.connect(&addr);
        self.handle = Some(socket);
        match result {
            Ok(()) => {
                self.state = SocketState::Connected;
                self.refresh_local();
                debug!(fd = self.raw_fd(), addr = %self.dst, "connected");
                Ok(SocketStatus::Success)
            }
            Err(err) if connect_in_progress(&err) => {
                self.state = SocketState::Connecting;
                trace!(fd = self.raw_fd(), addr = %self.dst, "connect in progress");
                Ok(SocketStatus::Retry)
            }
            Err(err) => {
                self.handle = None;
                Err(err.into())
            }
        }
    }

    /// Complete a connect that returned [`SocketStatus::Retry`].
    pub fn connect_finish(&mut self) -> Result<SocketStatus> {
        self.expect_state("connect_finish", &[SocketState::Connecting])?;
        let socket = self.socket("connect_finish")?;

        if let Some(err) = socket.take_error()? {
            warn!(fd = socket.as_raw_fd(), addr = %self.dst, error = %err, "connect failed");
            return Err(err.into());
        }
        match socket.peer_addr() {
            Ok(_) => {
                self.state = SocketState::Connected;
                self.refresh_local();
                debug!(fd = self.raw_fd(), addr = %self.dst, "connected");
                Ok(SocketStatus::Success)
            }
            Err(err) if err.raw_os_error() == Some(libc::ENOTCONN) => Ok(SocketStatus::Retry),
            Err(err) => Err(err.into()),
        }
    }

    /// Accept one pending connection, `None` if there is none yet.
    pub fn accept(&mut self) -> Result<Option<Self>> {
        self.expect_state("accept", &[SocketState::Listening])?;
        let socket = self.socket("accept")?;

        let (conn, peer) = match socket.accept() {
            Ok(pair) => pair,
            Err(err) if is_retry(&err) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        conn.set_nonblocking(true)?;
        if self.config.tcp_nodelay && !self.src.is_unix() {
            conn.set_nodelay(true)?;
        }

        let mut accepted = Self::with_config(SocketKind::Stream, self.config.clone());
        accepted.src.refresh_from(&conn.local_addr()?);
        accepted.dst.refresh_from(&peer);
        accepted.state = SocketState::Connected;
        debug!(
            fd = conn.as_raw_fd(),
            addr = %accepted.dst,
            listener = %self.src,
            "accepted connection"
        );
        accepted.handle = Some(conn);
        Ok(Some(accepted))
    }

    /// Refresh the count of bytes the kernel has ready for reading.
    ///
    /// A stream whose peer has closed reports 0 here; the close itself is
    /// reported by the next `read()`.
    pub fn to_read(&mut self) -> Result<SocketStatus> {
        let socket = self.socket("to_read")?;
        let pending = pending_bytes(socket)?;
        let eof = pending == 0
            && self.kind == SocketKind::Stream
            && self.state == SocketState::Connected
            && matches!(socket.peek(&mut [MaybeUninit::uninit()]), Ok(0));
        trace!(fd = socket.as_raw_fd(), bytes = pending, eof, "bytes pending");
        self.to_read = pending;
        self.peer_closed = eof;
        Ok(SocketStatus::Success)
    }

    /// Read up to the cached `to_read` count into the receive queue.
    ///
    /// Streams read at most `max_read_chunk` bytes per call. A datagram is
    /// always read whole, since the kernel drops whatever does not fit.
    /// Once `to_read()` has seen the peer close a stream, this closes the
    /// socket and fails with [`ProxyError::ConnectionClosed`].
    pub fn read(&mut self) -> Result<SocketStatus> {
        if self.to_read == 0 {
            if self.peer_closed {
                return Err(self.peer_gone());
            }
            return Ok(SocketStatus::Success);
        }
        let kind = self.kind;
        let want = match kind {
            SocketKind::Stream => self.to_read.min(self.config.max_read_chunk.max(1)),
            SocketKind::Datagram => self.to_read,
        };
        let socket = self.socket("read")?;
        let fd = socket.as_raw_fd();

        let mut buf = BytesMut::with_capacity(want);
        let received = {
            let spare = &mut buf.spare_capacity_mut()[..want];
            match kind {
                SocketKind::Stream => socket.recv(spare).map(|n| (n, None)),
                SocketKind::Datagram => socket.recv_from(spare).map(|(n, from)| (n, Some(from))),
            }
        };
        let (n, sender) = match received {
            Ok(pair) => pair,
            Err(err) if is_retry(&err) => return Ok(SocketStatus::Retry),
            Err(err) => return Err(err.into()),
        };

        if n == 0 && kind == SocketKind::Stream {
            return Err(self.peer_gone());
        }
        // SAFETY: the kernel initialised the first `n` bytes of the spare
        // capacity, and `n <= want <= capacity`.
        unsafe { buf.set_len(n) };
        self.recv_queue.append(buf.freeze());
        self.to_read = match kind {
            SocketKind::Stream => self.to_read.saturating_sub(n),
            // One datagram per read; the next size comes from `to_read()`.
            SocketKind::Datagram => 0,
        };
        if let Some(sender) = sender.filter(|_| !self.dst.is_set()) {
            self.dst.refresh_from(&sender);
        }
        trace!(fd, bytes = n, pending = self.to_read, "read");
        Ok(SocketStatus::Success)
    }

    /// Write queued bytes; `None` writes everything that is queued.
    ///
    /// Datagram sockets send each queued chunk as one datagram to `dst` and
    /// never split a chunk, so the budget is checked between datagrams.
    pub fn write(&mut self, max: Option<usize>) -> Result<SocketStatus> {
        let budget = max.unwrap_or(usize::MAX).min(self.send_queue.len());
        match self.kind {
            SocketKind::Stream => self.write_stream(budget),
            SocketKind::Datagram => self.write_datagrams(budget),
        }
    }

    fn write_stream(&mut self, mut budget: usize) -> Result<SocketStatus> {
        self.expect_state("write", &[SocketState::Connected])?;
        let max_iovecs = self.config.max_iovecs.max(1);
        let Some(socket) = self.handle.as_ref() else {
            return Err(self.invalid("write"));
        };
        let fd = socket.as_raw_fd();

        while budget > 0 {
            let sent = {
                let mut slices = Vec::with_capacity(max_iovecs.min(self.send_queue.chunk_count()));
                let mut planned = 0;
                for chunk in self.send_queue.chunks().take(max_iovecs) {
                    let take = chunk.len().min(budget - planned);
                    slices.push(IoSlice::new(&chunk[..take]));
                    planned += take;
                    if planned == budget {
                        break;
                    }
                }
                socket.send_vectored(&slices)
            };
            match sent {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => {
                    self.send_queue.advance(n);
                    budget -= n;
                    trace!(fd, bytes = n, queued = self.send_queue.len(), "wrote");
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(SocketStatus::Retry);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(SocketStatus::Success)
    }

    fn write_datagrams(&mut self, budget: usize) -> Result<SocketStatus> {
        let addr = self.dst.to_sock_addr("write")?;
        if self.handle.is_none() {
            self.expect_state("write", &[SocketState::Unbound])?;
            self.handle = Some(new_handle(self.kind, addr.domain())?);
            self.state = SocketState::Bound;
        } else {
            self.expect_state("write", &[SocketState::Bound])?;
        }
        let Some(socket) = self.handle.as_ref() else {
            return Err(self.invalid("write"));
        };
        let fd = socket.as_raw_fd();

        let mut written = 0;
        while written < budget {
            let Some(datagram) = self.send_queue.chunks().next() else {
                break;
            };
            let len = datagram.len();
            match socket.send_to(datagram, &addr) {
                Ok(_) => {
                    self.send_queue.advance(len);
                    written += len;
                    trace!(fd, bytes = len, addr = %self.dst, "sent datagram");
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(SocketStatus::Retry);
                }
                Err(err) => return Err(err.into()),
            }
        }
        self.refresh_local();
        Ok(SocketStatus::Success)
    }

    /// Close the descriptor. Queued bytes are kept.
    pub fn close(&mut self) {
        if let Some(socket) = self.handle.take() {
            debug!(
                fd = socket.as_raw_fd(),
                addr = %self.dst,
                state = %self.state,
                "closing socket"
            );
        }
        self.state = SocketState::Closed;
        self.to_read = 0;
        self.peer_closed = false;
    }

    fn peer_gone(&mut self) -> ProxyError {
        debug!(fd = self.raw_fd(), addr = %self.dst, "peer closed connection");
        self.close();
        ProxyError::ConnectionClosed
    }

    fn socket(&self, op: &'static str) -> Result<&Socket> {
        self.handle.as_ref().ok_or_else(|| self.invalid(op))
    }

    fn expect_state(&self, op: &'static str, allowed: &[SocketState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.invalid(op))
        }
    }

    fn invalid(&self, op: &'static str) -> ProxyError {
        ProxyError::InvalidState {
            op,
            state: self.state.as_str(),
        }
    }

    fn refresh_local(&mut self) {
        let local = self.handle.as_ref().map(Socket::local_addr);
        if let Some(Ok(local)) = local {
            self.src.refresh_from(&local);
        }
    }
}

/// A fresh non-blocking, close-on-exec descriptor.
fn new_handle(kind: SocketKind, domain: Domain) -> io::Result<Socket> {
    let unix = domain == Domain::UNIX;
    let (ty, protocol) = match kind {
        SocketKind::Stream => (Type::STREAM, (!unix).then_some(Protocol::TCP)),
        SocketKind::Datagram => (Type::DGRAM, (!unix).then_some(Protocol::UDP)),
    };
    let socket = Socket::new(domain, ty, protocol)?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

fn is_retry(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

fn connect_in_progress(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EINPROGRESS) || err.kind() == io::ErrorKind::WouldBlock
}

/// Bytes the kernel has buffered for reading (`FIONREAD`).
fn pending_bytes(socket: &Socket) -> io::Result<usize> {
    let mut pending: libc::c_int = 0;
    // SAFETY: FIONREAD stores one c_int through the pointer, which refers to
    // a live local for the duration of the call.
    let rc = unsafe { libc::ioctl(socket.as_raw_fd(), libc::FIONREAD, &raw mut pending) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(usize::try_from(pending).unwrap_or(0))
}
