use crate::addr::Address;
use crate::error::{NetError, NetResult};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read, Write};
use std::mem::MaybeUninit;
use std::net::Shutdown;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

/// Non-blocking capable BSD-socket facade.
///
/// A thin state machine over one descriptor: open (or accept) a socket,
/// move bytes, close. Three modes of waiting:
///
/// - **Blocking, no timeout** (`timeout_ms == 0`): operations block
///   indefinitely in the OS.
/// - **Blocking with timeout**: read/write/accept first wait for
///   readiness up to the timeout and fail with [`NetError::Timeout`].
/// - **Non-blocking**: every operation returns immediately; callers get
///   [`NetError::WouldBlock`] and multiplex readiness themselves (see
///   [`wait_readable`](Self::wait_readable) /
///   [`wait_writable`](Self::wait_writable)).
///
/// Signal interruption is retried transparently while
/// [`set_autoresume`](Self::set_autoresume) is enabled (the default);
/// with it disabled, interrupted calls fail with [`NetError::Signal`].
///
/// The last error is sticky: it stays readable through
/// [`last_error`](Self::last_error) until cleared or the device is
/// closed.
pub struct SocketDevice {
    sock: Option<Socket>,
    timeout_ms: u64,
    nonblock: bool,
    autoresume: bool,
    resolve_enabled: bool,
    last_error: Option<NetError>,
}

impl SocketDevice {
    /// Creates a device with no descriptor; open, listen, connect, or
    /// accept attaches one.
    pub fn new() -> Self {
        Self {
            sock: None,
            timeout_ms: 0,
            nonblock: false,
            autoresume: true,
            resolve_enabled: true,
            last_error: None,
        }
    }

    /// Opens a raw socket of the given family and type.
    pub fn open(&mut self, domain: Domain, ty: Type, protocol: Option<Protocol>) -> NetResult<()> {
        let sock = Socket::new(domain, ty, protocol).map_err(|e| self.fail(e))?;
        if self.nonblock {
            sock.set_nonblocking(true).map_err(|e| self.fail(e))?;
        }
        self.sock = Some(sock);
        self.last_error = None;
        Ok(())
    }

    /// Whether the device currently holds a descriptor.
    pub fn is_open(&self) -> bool {
        self.sock.is_some()
    }

    /// Blocking-mode timeout for read/write/accept, 0 for indefinite.
    pub fn set_timeout_ms(&mut self, ms: u64) {
        self.timeout_ms = ms;
    }

    /// Whether to transparently retry calls interrupted by signals.
    pub fn set_autoresume(&mut self, enable: bool) {
        self.autoresume = enable;
    }

    /// Whether listen/connect helpers may resolve names; with this off,
    /// only numeric address forms are accepted.
    pub fn set_resolve_enabled(&mut self, enable: bool) {
        self.resolve_enabled = enable;
    }

    /// Switches non-blocking I/O on the descriptor. The flag persists
    /// across close and reopen.
    pub fn set_nonblocking(&mut self, enable: bool) -> NetResult<()> {
        if let Some(sock) = &self.sock {
            sock.set_nonblocking(enable).map_err(|e| self.fail(e))?;
        }
        self.nonblock = enable;
        Ok(())
    }

    /// Last sticky error, if any.
    pub fn last_error(&self) -> Option<NetError> {
        self.last_error
    }

    /// Clears the sticky error state.
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    // ---------------------------------------------------------------------
    // SERVER / CLIENT SETUP
    // ---------------------------------------------------------------------

    /// Binds `addr` and starts listening. Opens a matching stream socket
    /// if none is open; sets reuse-address so restarts don't trip on
    /// lingering TIME_WAIT pairs.
    pub fn listen(&mut self, addr: &Address, backlog: i32) -> NetResult<()> {
        if self.sock.is_none() {
            self.open(addr.domain(), Type::STREAM, None)?;
        }
        let sa = addr.to_sock_addr().map_err(|e| self.fail_net(e))?;
        if !matches!(addr, Address::Unix(_)) {
            let r = self.require()?.set_reuse_address(true);
            r.map_err(|e| self.fail(e))?;
        }
        let r = self.require()?.bind(&sa);
        r.map_err(|e| self.fail(e))?;
        let r = self.require()?.listen(backlog);
        r.map_err(|e| self.fail(e))
    }

    /// Binds `addr` without listening, e.g. for datagram sockets. Opens
    /// a matching datagram socket if none is open.
    pub fn bind(&mut self, addr: &Address) -> NetResult<()> {
        if self.sock.is_none() {
            self.open(addr.domain(), Type::DGRAM, None)?;
        }
        let sa = addr.to_sock_addr().map_err(|e| self.fail_net(e))?;
        let r = self.require()?.bind(&sa);
        r.map_err(|e| self.fail(e))
    }

    /// Resolves `host` (if resolution is enabled) and listens on it.
    pub fn listen_host(&mut self, host: &str, default_port: u16, backlog: i32) -> NetResult<()> {
        let addr = self.lookup(host, default_port)?;
        self.listen(&addr, backlog)
    }

    /// Accepts one connection, returning the connected device and the
    /// peer address.
    ///
    /// Blocking mode honours the configured timeout; non-blocking mode
    /// fails with [`NetError::WouldBlock`] when no connection is pending.
    /// The accepted device inherits this device's flags and starts in
    /// blocking mode unless the listener is non-blocking.
    pub fn accept(&mut self) -> NetResult<(SocketDevice, Option<Address>)> {
        if !self.nonblock && self.timeout_ms > 0 {
            self.wait_readable(self.timeout_ms)?;
        }
        loop {
            let result = self.require()?.accept();
            match result {
                Ok((sock, peer)) => {
                    if self.nonblock {
                        sock.set_nonblocking(true).map_err(|e| self.fail(e))?;
                    }
                    let device = SocketDevice {
                        sock: Some(sock),
                        timeout_ms: self.timeout_ms,
                        nonblock: self.nonblock,
                        autoresume: self.autoresume,
                        resolve_enabled: self.resolve_enabled,
                        last_error: None,
                    };
                    return Ok((device, Address::from_sock_addr(&peer)));
                }
                Err(err) => {
                    if err.raw_os_error() == Some(libc::EINTR) && self.autoresume {
                        continue;
                    }
                    return Err(self.fail(err));
                }
            }
        }
    }

    /// Connects to `addr`. Blocking mode honours the configured timeout.
    pub fn connect(&mut self, addr: &Address) -> NetResult<()> {
        if self.sock.is_none() {
            self.open(addr.domain(), Type::STREAM, None)?;
        }
        let sa = addr.to_sock_addr().map_err(|e| self.fail_net(e))?;
        let timeout = self.timeout_ms;
        let nonblock = self.nonblock;
        let sock = self.require()?;
        let result = if !nonblock && timeout > 0 {
            sock.connect_timeout(&sa, Duration::from_millis(timeout))
        } else {
            sock.connect(&sa)
        };
        result.map_err(|e| self.fail(e))
    }

    /// Resolves `host` (if resolution is enabled) and connects to it.
    pub fn connect_host(&mut self, host: &str, default_port: u16) -> NetResult<()> {
        let addr = self.lookup(host, default_port)?;
        self.connect(&addr)
    }

    fn lookup(&mut self, host: &str, default_port: u16) -> NetResult<Address> {
        match Address::parse(host) {
            Ok(addr) => Ok(if addr.port() == 0 {
                addr.with_port(default_port)
            } else {
                addr
            }),
            Err(_) if self.resolve_enabled => {
                Address::resolve(host, default_port).map_err(|e| self.fail_net(e))
            }
            Err(e) => Err(self.fail_net(e)),
        }
    }

    // ---------------------------------------------------------------------
    // DATA TRANSFER
    // ---------------------------------------------------------------------

    /// Reads into `buf`, returning the byte count (0 at end of stream).
    pub fn read(&mut self, buf: &mut [u8]) -> NetResult<usize> {
        if !self.nonblock && self.timeout_ms > 0 {
            self.wait_readable(self.timeout_ms)?;
        }
        loop {
            let result = {
                let mut sock = self.require()?;
                sock.read(buf)
            };
            match result {
                Ok(n) => return Ok(n),
                Err(err) if self.resumable(&err) => continue,
                Err(err) => return Err(self.fail(err)),
            }
        }
    }

    /// Writes from `buf`, returning the byte count actually written.
    pub fn write(&mut self, buf: &[u8]) -> NetResult<usize> {
        if !self.nonblock && self.timeout_ms > 0 {
            self.wait_writable(self.timeout_ms)?;
        }
        loop {
            let result = {
                let mut sock = self.require()?;
                sock.write(buf)
            };
            match result {
                Ok(n) => return Ok(n),
                Err(err) if self.resumable(&err) => continue,
                Err(err) => return Err(self.fail(err)),
            }
        }
    }

    /// Datagram receive; returns the byte count and the sender.
    pub fn read_from(&mut self, buf: &mut [u8]) -> NetResult<(usize, Option<Address>)> {
        if !self.nonblock && self.timeout_ms > 0 {
            self.wait_readable(self.timeout_ms)?;
        }
        loop {
            // SAFETY: u8 and MaybeUninit<u8> share layout, and recv_from
            // only writes initialized bytes it then reports.
            let uninit = unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
            let result = self.require()?.recv_from(uninit);
            match result {
                Ok((n, peer)) => return Ok((n, Address::from_sock_addr(&peer))),
                Err(err) if self.resumable(&err) => continue,
                Err(err) => return Err(self.fail(err)),
            }
        }
    }

    /// Datagram send to `addr`.
    pub fn write_to(&mut self, buf: &[u8], addr: &Address) -> NetResult<usize> {
        let sa = addr.to_sock_addr().map_err(|e| self.fail_net(e))?;
        loop {
            let result = self.require()?.send_to(buf, &sa);
            match result {
                Ok(n) => return Ok(n),
                Err(err) if self.resumable(&err) => continue,
                Err(err) => return Err(self.fail(err)),
            }
        }
    }

    // ---------------------------------------------------------------------
    // READINESS
    // ---------------------------------------------------------------------

    /// Waits until the descriptor is readable, up to `timeout_ms`
    /// (0 waits indefinitely). Fails with [`NetError::Timeout`] on
    /// expiry.
    pub fn wait_readable(&mut self, timeout_ms: u64) -> NetResult<()> {
        self.wait_events(libc::POLLIN, timeout_ms)
    }

    /// Waits until the descriptor is writable, like
    /// [`wait_readable`](Self::wait_readable).
    pub fn wait_writable(&mut self, timeout_ms: u64) -> NetResult<()> {
        self.wait_events(libc::POLLOUT, timeout_ms)
    }

    fn wait_events(&mut self, events: i16, timeout_ms: u64) -> NetResult<()> {
        let fd = self.require()?.as_raw_fd();
        let timeout = if timeout_ms == 0 {
            -1
        } else {
            i32::try_from(timeout_ms).unwrap_or(i32::MAX)
        };
        let mut pfd = libc::pollfd {
            fd,
            events,
            revents: 0,
        };
        loop {
            let rc = unsafe { libc::poll(&mut pfd, 1, timeout) };
            if rc > 0 {
                if pfd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
                    return Err(self.fail_net(NetError::Fail));
                }
                return Ok(());
            }
            if rc == 0 {
                return Err(self.fail_net(NetError::Timeout));
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) && self.autoresume {
                continue;
            }
            return Err(self.fail(err));
        }
    }

    // ---------------------------------------------------------------------
    // OPTIONS
    // ---------------------------------------------------------------------

    pub fn set_reuse_address(&mut self, enable: bool) -> NetResult<()> {
        let r = self.require()?.set_reuse_address(enable);
        r.map_err(|e| self.fail(e))
    }

    pub fn set_nodelay(&mut self, enable: bool) -> NetResult<()> {
        let r = self.require()?.set_nodelay(enable);
        r.map_err(|e| self.fail(e))
    }

    pub fn set_keepalive(&mut self, enable: bool) -> NetResult<()> {
        let r = self.require()?.set_keepalive(enable);
        r.map_err(|e| self.fail(e))
    }

    pub fn set_linger(&mut self, linger: Option<Duration>) -> NetResult<()> {
        let r = self.require()?.set_linger(linger);
        r.map_err(|e| self.fail(e))
    }

    pub fn set_recv_buffer_size(&mut self, size: usize) -> NetResult<()> {
        let r = self.require()?.set_recv_buffer_size(size);
        r.map_err(|e| self.fail(e))
    }

    pub fn recv_buffer_size(&mut self) -> NetResult<usize> {
        let r = self.require()?.recv_buffer_size();
        r.map_err(|e| self.fail(e))
    }

    pub fn set_send_buffer_size(&mut self, size: usize) -> NetResult<()> {
        let r = self.require()?.set_send_buffer_size(size);
        r.map_err(|e| self.fail(e))
    }

    /// Local address of the descriptor, e.g. after binding port 0.
    pub fn local_addr(&mut self) -> NetResult<Address> {
        let r = self.require()?.local_addr();
        let sa = r.map_err(|e| self.fail(e))?;
        Address::from_sock_addr(&sa).ok_or(NetError::Inval)
    }

    // ---------------------------------------------------------------------
    // TEARDOWN
    // ---------------------------------------------------------------------

    /// Shuts down one or both directions of the connection.
    pub fn shutdown(&mut self, how: Shutdown) -> NetResult<()> {
        let r = self.require()?.shutdown(how);
        r.map_err(|e| self.fail(e))
    }

    /// Closes the descriptor and clears the sticky error.
    pub fn close(&mut self) {
        self.sock = None;
        self.last_error = None;
    }

    // ---------------------------------------------------------------------
    // INTERNAL
    // ---------------------------------------------------------------------

    fn require(&mut self) -> NetResult<&Socket> {
        match &self.sock {
            Some(sock) => Ok(sock),
            None => {
                self.last_error = Some(NetError::Closed);
                Err(NetError::Closed)
            }
        }
    }

    fn resumable(&self, err: &io::Error) -> bool {
        self.autoresume && err.raw_os_error() == Some(libc::EINTR)
    }

    fn fail(&mut self, err: io::Error) -> NetError {
        let net = NetError::from(err);
        self.last_error = Some(net);
        net
    }

    fn fail_net(&mut self, err: NetError) -> NetError {
        self.last_error = Some(err);
        err
    }
}

impl Default for SocketDevice {
    fn default() -> Self {
        Self::new()
    }
}
