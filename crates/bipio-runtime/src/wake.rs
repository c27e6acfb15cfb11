//! Wake channel - interrupts the reactor's blocking wait.
//!
//! A non-blocking pipe. Writers drop one byte in whenever registry
//! membership changes; the payload is meaningless. The reactor watches the
//! read end, drains it, and rebuilds its watch set. Closing the write end
//! (`hang_up`) makes the read end report hang-up, which is the reactor's
//! signal to exit.
//!
//! A pipe is used rather than an eventfd because the hang-up edge doubles as
//! the shutdown signal.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::{Mutex, PoisonError};

use bipio_core::{kwarn, RawHandle, SetupError, SetupResult};

use crate::sys;

/// Signals the reactor that its watch set is stale.
///
/// **Contract:**
/// - `notify()` must NEVER block.
/// - Signals may coalesce: several notifies before the reactor wakes
///   produce one wake-up.
pub trait Notifier: Send + Sync {
    /// Signal a membership change. Returns the raw OS error on failure.
    fn notify(&self) -> Result<(), i32>;
}

/// Outcome of draining the read end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drain {
    /// Pending signal bytes discarded (count may be 0 on a spurious wake)
    Drained(usize),
    /// Write end is closed
    HungUp,
}

/// Pipe-backed wake channel.
pub struct WakeChannel {
    reader: OwnedFd,
    /// `None` once hung up
    writer: Mutex<Option<OwnedFd>>,
}

impl WakeChannel {
    /// Allocate the pipe, both ends non-blocking and close-on-exec.
    pub fn new() -> SetupResult<Self> {
        let mut fds = [0 as libc::c_int; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(SetupError::WakeChannel(sys::last_errno() as i32));
        }
        // Take ownership first so both ends are closed on any early return.
        let reader = unsafe { OwnedFd::from_raw_fd(fds[0]) };
        let writer = unsafe { OwnedFd::from_raw_fd(fds[1]) };

        for fd in [fds[0], fds[1]] {
            sys::set_nonblocking(fd).map_err(SetupError::WakeChannel)?;
            if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } < 0 {
                return Err(SetupError::WakeChannel(sys::last_errno() as i32));
            }
        }

        Ok(Self {
            reader,
            writer: Mutex::new(Some(writer)),
        })
    }

    /// Read end, for the reactor's watch set.
    pub fn reader_handle(&self) -> RawHandle {
        self.reader.as_raw_fd()
    }

    /// Discard every pending signal byte.
    pub fn drain(&self) -> Drain {
        let mut scratch = [0u8; 128];
        let mut total = 0;
        loop {
            match sys::read(self.reader.as_raw_fd(), &mut scratch) {
                sys::SysIo::Done(n) => total += n,
                sys::SysIo::Eof => return Drain::HungUp,
                sys::SysIo::WouldBlock => return Drain::Drained(total),
                sys::SysIo::Failed(code) => {
                    kwarn!("wake channel read failed: errno {}", code);
                    return Drain::Drained(total);
                }
            }
        }
    }

    /// Close the write end. Idempotent.
    pub fn hang_up(&self) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.take();
    }

    pub fn is_hung_up(&self) -> bool {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Notifier for WakeChannel {
    fn notify(&self) -> Result<(), i32> {
        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(fd) = writer.as_ref() else {
            // Engine is shutting down; nobody is listening.
            return Ok(());
        };
        match sys::write(fd.as_raw_fd(), &[0u8], false) {
            // A full pipe already holds a pending signal.
            sys::SysIo::Done(_) | sys::SysIo::WouldBlock => Ok(()),
            sys::SysIo::Eof => Ok(()),
            sys::SysIo::Failed(code) => Err(code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_then_drain() {
        let wake = WakeChannel::new().unwrap();
        assert_eq!(wake.drain(), Drain::Drained(0));

        wake.notify().unwrap();
        wake.notify().unwrap();
        wake.notify().unwrap();
        assert_eq!(wake.drain(), Drain::Drained(3));
        assert_eq!(wake.drain(), Drain::Drained(0));
    }

    #[test]
    fn test_both_ends_nonblocking_and_cloexec() {
        let wake = WakeChannel::new().unwrap();
        let writer = wake.writer.lock().unwrap().as_ref().map(|fd| fd.as_raw_fd()).unwrap();
        for fd in [wake.reader_handle(), writer] {
            let fd_flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
            assert!(fd_flags >= 0);
            assert_ne!(fd_flags & libc::FD_CLOEXEC, 0, "fd {} not close-on-exec", fd);

            let fl_flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
            assert_ne!(fl_flags & libc::O_NONBLOCK, 0, "fd {} blocking", fd);
        }
    }

    #[test]
    fn test_hang_up() {
        let wake = WakeChannel::new().unwrap();
        wake.notify().unwrap();
        assert!(!wake.is_hung_up());

        wake.hang_up();
        wake.hang_up();
        assert!(wake.is_hung_up());
        // Notify after hang-up is silently dropped
        assert!(wake.notify().is_ok());

        // Leftover byte first, then the hang-up shows as EOF
        assert_eq!(wake.drain(), Drain::HungUp);
    }

    #[test]
    fn test_many_signals_never_block() {
        let wake = WakeChannel::new().unwrap();
        // Far beyond any pipe buffer
        for _ in 0..200_000 {
            wake.notify().unwrap();
        }
        assert!(matches!(wake.drain(), Drain::Drained(n) if n > 0));
    }
}
