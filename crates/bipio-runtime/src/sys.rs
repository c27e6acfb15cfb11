//! Thin syscall wrappers over raw descriptors.
//!
//! Every transfer is a single `read(2)` / `write(2)` / `send(2)`; `EINTR`
//! is retried in place, everything else is classified into [`SysIo`].

use bipio_core::RawHandle;
use nix::errno::Errno;

/// Outcome of one transfer attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SysIo {
    /// `n > 0` bytes moved
    Done(usize),
    /// Zero-byte result: peer closed
    Eof,
    /// Non-blocking handle has nothing to give / no room to take
    WouldBlock,
    /// Any other failure (raw OS error code)
    Failed(i32),
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))] {
        const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
    } else {
        const SEND_FLAGS: libc::c_int = 0;
    }
}

#[inline]
pub(crate) fn is_would_block(e: Errno) -> bool {
    e == Errno::EAGAIN || e == Errno::EWOULDBLOCK
}

/// errno of the last failed call on this thread
#[inline]
pub(crate) fn last_errno() -> Errno {
    Errno::last()
}

/// `None` means "interrupted, try again".
fn classify(ret: isize) -> Option<SysIo> {
    match ret {
        0 => Some(SysIo::Eof),
        n if n > 0 => Some(SysIo::Done(n as usize)),
        _ => {
            let e = last_errno();
            if e == Errno::EINTR {
                None
            } else if is_would_block(e) {
                Some(SysIo::WouldBlock)
            } else {
                Some(SysIo::Failed(e as i32))
            }
        }
    }
}

/// One `read(2)` into `buf`.
pub(crate) fn read(fd: RawHandle, buf: &mut [u8]) -> SysIo {
    loop {
        let ret = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if let Some(io) = classify(ret) {
            return io;
        }
    }
}

/// One `write(2)` of `buf`, or `send(2)` with SIGPIPE suppressed for sockets.
pub(crate) fn write(fd: RawHandle, buf: &[u8], socket: bool) -> SysIo {
    loop {
        let ret = unsafe {
            if socket {
                libc::send(fd, buf.as_ptr() as *const libc::c_void, buf.len(), SEND_FLAGS)
            } else {
                libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len())
            }
        };
        if let Some(io) = classify(ret) {
            return io;
        }
    }
}

/// Add `O_NONBLOCK` to the descriptor's status flags.
pub fn set_nonblocking(fd: RawHandle) -> Result<(), i32> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags == -1 {
        return Err(last_errno() as i32);
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } != 0 {
        return Err(last_errno() as i32);
    }
    Ok(())
}

pub(crate) fn close(fd: RawHandle) -> Result<(), i32> {
    nix::unistd::close(fd).map_err(|e| e as i32)
}

/// Shut both directions of a connected socket.
pub(crate) fn shutdown(fd: RawHandle) -> Result<(), i32> {
    nix::sys::socket::shutdown(fd, nix::sys::socket::Shutdown::Both).map_err(|e| e as i32)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Connected AF_UNIX stream pair, both ends non-blocking.
    pub(crate) fn socket_pair() -> (RawHandle, RawHandle) {
        let mut fds = [0 as libc::c_int; 2];
        let ret = unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) };
        assert_eq!(ret, 0, "socketpair failed");
        set_nonblocking(fds[0]).unwrap();
        set_nonblocking(fds[1]).unwrap();
        (fds[0], fds[1])
    }

    #[test]
    fn test_read_would_block_then_data() {
        let (a, b) = socket_pair();
        let mut buf = [0u8; 16];
        assert_eq!(read(a, &mut buf), SysIo::WouldBlock);

        assert_eq!(write(b, b"ping", true), SysIo::Done(4));
        assert_eq!(read(a, &mut buf), SysIo::Done(4));
        assert_eq!(&buf[..4], b"ping");

        close(a).unwrap();
        close(b).unwrap();
    }

    #[test]
    fn test_peer_close_reads_eof_and_write_fails() {
        let (a, b) = socket_pair();
        close(b).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(read(a, &mut buf), SysIo::Eof);
        assert_eq!(write(a, b"x", true), SysIo::Failed(libc::EPIPE));
        close(a).unwrap();
    }

    #[test]
    fn test_bad_descriptor() {
        let mut buf = [0u8; 4];
        assert_eq!(read(-1, &mut buf), SysIo::Failed(libc::EBADF));
        assert_eq!(set_nonblocking(-1), Err(libc::EBADF));
    }
}
