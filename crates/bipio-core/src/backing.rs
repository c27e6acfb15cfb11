//! Handle type and the backing-resource abstraction.
//!
//! A `Backing` owns the teardown policy of whatever sits behind a stream's
//! handle. The buffering code never closes a handle itself; `close()` hands
//! the handle to `Backing::release` exactly once.
//!
//! # Implementors (in `bipio-runtime`)
//!
//! - `Descriptor`: plain file descriptor, released with `close(2)`.
//! - `Connection`: accepted socket, shut down then closed.
//! - `Listener`: listening socket, closed.
//! - `Detached`: handle owned elsewhere, release is a no-op.

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        /// OS handle (a `HANDLE` value)
        pub type RawHandle = isize;
    } else {
        /// OS handle (a file descriptor)
        pub type RawHandle = i32;
    }
}

/// Sentinel for "no handle". Compared against everywhere a handle is validated.
pub const INVALID_HANDLE: RawHandle = -1;

/// `true` unless `handle` is the invalid sentinel.
#[inline]
pub const fn is_valid_handle(handle: RawHandle) -> bool {
    handle != INVALID_HANDLE
}

/// Resource behind a stream handle.
///
/// **Contract:**
/// - `release()` is called at most once per stream, with the stream lock held.
/// - It must not block for long; it runs on whichever thread calls `close()`.
/// - Errors are logged by the caller and otherwise ignored: the handle is
///   considered gone either way.
pub trait Backing: Send {
    /// Release the OS resource behind `handle`.
    ///
    /// Returns the raw OS error code on failure.
    fn release(&mut self, handle: RawHandle) -> Result<(), i32>;

    /// Short name used in logs
    fn kind(&self) -> &'static str;

    /// Whether `handle` is a socket (enables `send(2)` with signal suppression).
    fn is_socket(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recording {
        released: Vec<RawHandle>,
    }

    impl Backing for Recording {
        fn release(&mut self, handle: RawHandle) -> Result<(), i32> {
            self.released.push(handle);
            Ok(())
        }

        fn kind(&self) -> &'static str {
            "recording"
        }
    }

    #[test]
    fn test_sentinel() {
        assert!(!is_valid_handle(INVALID_HANDLE));
        assert!(is_valid_handle(0));
        assert!(is_valid_handle(7));
    }

    #[test]
    fn test_trait_object_release() {
        let mut backing: Box<dyn Backing> = Box::new(Recording { released: Vec::new() });
        assert!(!backing.is_socket());
        assert_eq!(backing.kind(), "recording");
        assert!(backing.release(3).is_ok());
    }
}
