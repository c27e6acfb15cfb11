//! Concrete `Backing` implementations, one per transport kind.

use bipio_core::{Backing, RawHandle};

use crate::sys;

/// Plain descriptor (pipe end, file, tty). Released with `close(2)`.
#[derive(Debug, Default)]
pub struct Descriptor;

impl Backing for Descriptor {
    fn release(&mut self, handle: RawHandle) -> Result<(), i32> {
        sys::close(handle)
    }

    fn kind(&self) -> &'static str {
        "descriptor"
    }
}

/// Connected socket produced by `accept()`.
///
/// Shut down before closing so the peer sees EOF even if the descriptor
/// was duplicated elsewhere.
#[derive(Debug, Default)]
pub struct Connection;

impl Backing for Connection {
    fn release(&mut self, handle: RawHandle) -> Result<(), i32> {
        // ENOTCONN just means the peer got there first.
        let _ = sys::shutdown(handle);
        sys::close(handle)
    }

    fn kind(&self) -> &'static str {
        "connection"
    }

    fn is_socket(&self) -> bool {
        true
    }
}

/// Listening socket owned by a `Socket`.
#[derive(Debug, Default)]
pub struct Listener;

impl Backing for Listener {
    fn release(&mut self, handle: RawHandle) -> Result<(), i32> {
        sys::close(handle)
    }

    fn kind(&self) -> &'static str {
        "listener"
    }

    fn is_socket(&self) -> bool {
        true
    }
}

/// Handle owned by someone else (e.g. stdin). Release does nothing.
#[derive(Debug, Default)]
pub struct Detached;

impl Backing for Detached {
    fn release(&mut self, _handle: RawHandle) -> Result<(), i32> {
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "detached"
    }
}
