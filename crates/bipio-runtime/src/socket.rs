//! Socket factory
//!
//! Creates non-blocking IPv4 sockets, binds and listens, and turns accepted
//! connections into [`Stream`]s bound to the engine.
//!
//! ```ignore
//! let mut listener = Socket::create(&engine.handle(), Protocol::Tcp)?;
//! listener.listen("0.0.0.0", 8080, None)?;
//! loop {
//!     if let Some(conn) = listener.accept()? {
//!         // conn is READ | WRITE | NONBLOCKING
//!     }
//! }
//! ```

use std::fmt;
use std::mem;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

use bipio_core::backing::is_valid_handle;
use bipio_core::{
    kdebug, kwarn, Backing, RawHandle, SetupError, SetupResult, StreamFlags, INVALID_HANDLE,
};
use nix::errno::Errno;

use crate::backing::{Connection, Listener};
use crate::engine::EngineHandle;
use crate::stream::Stream;
use crate::sys;

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))] {
        const SOCK_FLAGS: libc::c_int = libc::SOCK_CLOEXEC;
    } else {
        const SOCK_FLAGS: libc::c_int = 0;
    }
}

/// Transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }

    fn sock_type(self) -> libc::c_int {
        match self {
            Protocol::Tcp => libc::SOCK_STREAM,
            Protocol::Udp => libc::SOCK_DGRAM,
        }
    }
}

/// Protocol name was neither "tcp" nor "udp"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProtocol(pub String);

impl fmt::Display for UnknownProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown protocol: {}", self.0)
    }
}

impl std::error::Error for UnknownProtocol {}

impl FromStr for Protocol {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            _ => Err(UnknownProtocol(s.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-blocking IPv4 socket owned by the host.
pub struct Socket {
    handle: RawHandle,
    protocol: Protocol,
    engine: EngineHandle,
    backing: Listener,
}

impl Socket {
    /// Allocate a non-blocking socket.
    pub fn create(engine: &EngineHandle, protocol: Protocol) -> SetupResult<Self> {
        let fd = unsafe { libc::socket(libc::AF_INET, protocol.sock_type() | SOCK_FLAGS, 0) };
        if fd == INVALID_HANDLE {
            return Err(SetupError::Socket(sys::last_errno() as i32));
        }

        if let Err(code) = sys::set_nonblocking(fd) {
            let _ = sys::close(fd);
            return Err(SetupError::Nonblocking(code));
        }

        if protocol == Protocol::Tcp {
            let opt: libc::c_int = 1;
            let ret = unsafe {
                libc::setsockopt(
                    fd,
                    libc::SOL_SOCKET,
                    libc::SO_REUSEADDR,
                    &opt as *const _ as *const libc::c_void,
                    mem::size_of_val(&opt) as libc::socklen_t,
                )
            };
            if ret != 0 {
                kwarn!("socket fd {}: SO_REUSEADDR failed: errno {}", fd, sys::last_errno() as i32);
            }
        }

        kdebug!("socket fd {}: created ({})", fd, protocol);
        Ok(Self {
            handle: fd,
            protocol,
            engine: engine.clone(),
            backing: Listener,
        })
    }

    fn live_handle(&self) -> SetupResult<RawHandle> {
        if is_valid_handle(self.handle) {
            Ok(self.handle)
        } else {
            Err(SetupError::Closed)
        }
    }

    /// Bind to `address:port` and start listening.
    ///
    /// `address` must be a dotted-quad IPv4 address. `backlog` defaults to
    /// the engine's configured value.
    pub fn listen(&self, address: &str, port: u16, backlog: Option<i32>) -> SetupResult<()> {
        let fd = self.live_handle()?;
        let ip: Ipv4Addr = address
            .parse()
            .map_err(|_| SetupError::InvalidAddress(address.to_string()))?;

        let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };
        addr.sin_family = libc::AF_INET as libc::sa_family_t;
        addr.sin_port = port.to_be();
        addr.sin_addr.s_addr = u32::from(ip).to_be();

        let ret = unsafe {
            libc::bind(
                fd,
                &addr as *const _ as *const libc::sockaddr,
                mem::size_of_val(&addr) as libc::socklen_t,
            )
        };
        if ret != 0 {
            return Err(SetupError::Bind(sys::last_errno() as i32));
        }

        let backlog = backlog.unwrap_or(self.engine.config().listen_backlog);
        if unsafe { libc::listen(fd, backlog) } != 0 {
            return Err(SetupError::Listen(sys::last_errno() as i32));
        }

        kdebug!("socket fd {}: listening on {}:{} (backlog {})", fd, ip, port, backlog);
        Ok(())
    }

    /// Accept one pending connection, if any.
    ///
    /// `Ok(None)` means nothing is waiting. The new stream is non-blocking
    /// and readable/writable, and closes its socket when dropped.
    pub fn accept(&self) -> SetupResult<Option<Stream>> {
        let fd = self.live_handle()?;
        let conn = loop {
            let conn = unsafe { libc::accept(fd, std::ptr::null_mut(), std::ptr::null_mut()) };
            if conn != INVALID_HANDLE {
                break conn;
            }
            match sys::last_errno() {
                Errno::EINTR => continue,
                e if sys::is_would_block(e) => return Ok(None),
                e => {
                    kdebug!("socket fd {}: accept failed: {}", fd, e);
                    return Err(SetupError::Accept(e as i32));
                }
            }
        };

        let mut backing = Connection;
        if let Err(code) = sys::set_nonblocking(conn) {
            let _ = backing.release(conn);
            return Err(SetupError::Nonblocking(code));
        }

        kdebug!("socket fd {}: accepted fd {}", fd, conn);
        let flags = StreamFlags::READ | StreamFlags::WRITE | StreamFlags::NONBLOCKING;
        Ok(Some(self.engine.wrap_handle(conn, flags, 0, backing)))
    }

    /// Bound local address.
    pub fn local_addr(&self) -> SetupResult<SocketAddrV4> {
        let fd = self.live_handle()?;
        let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockname(fd, &mut addr as *mut _ as *mut libc::sockaddr, &mut len)
        };
        if ret != 0 {
            return Err(SetupError::Socket(sys::last_errno() as i32));
        }
        Ok(SocketAddrV4::new(
            Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr)),
            u16::from_be(addr.sin_port),
        ))
    }

    /// Release the socket. Idempotent.
    pub fn close(&mut self) {
        if !is_valid_handle(self.handle) {
            return;
        }
        if let Err(code) = self.backing.release(self.handle) {
            kwarn!("socket fd {}: close failed: errno {}", self.handle, code);
        }
        self.handle = INVALID_HANDLE;
    }

    pub fn is_closed(&self) -> bool {
        !is_valid_handle(self.handle)
    }

    pub fn handle(&self) -> RawHandle {
        self.handle
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("handle", &self.handle)
            .field("protocol", &self.protocol)
            .finish()
    }
}
