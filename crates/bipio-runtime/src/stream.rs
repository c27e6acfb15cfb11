//! Stream - buffered, pump-driven wrapper over one OS handle.
//!
//! A stream owns an inbound [`BipBuffer`] and, when writable, an outbound
//! one. `read` and `write` only ever touch the buffers plus one pump pass;
//! whatever the handle cannot take right now is finished later by the
//! reactor.
//!
//! ```text
//!   host read()  <-- inbound  <-- pump <-- read(2)  <-- handle
//!   host write() --> outbound --> pump --> write(2) --> handle
//!                                  ^
//!                  reactor --------+  (when the handle is ready)
//! ```
//!
//! # Registry membership
//!
//! A non-blocking stream is registered exactly while its last pump pass
//! ended with at least one side blocked, with the interest set to the
//! blocked sides. Blocking streams never register.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bipio_core::backing::is_valid_handle;
use bipio_core::constants::{self, INBOUND, OUTBOUND};
use bipio_core::{
    kdebug, ktrace, kwarn, Backing, BipBuffer, Operation, RawHandle, StreamError, StreamFlags,
    StreamResult, INVALID_HANDLE,
};

use crate::engine::EngineHandle;
use crate::registry::{Interest, PendingOpRegistry, PumpTarget};
use crate::sys::{self, SysIo};

/// Result of a successful [`Stream::read`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes taken from the inbound buffer
    Data(Vec<u8>),
    /// Nothing buffered yet; the stream is still open
    Empty,
    /// Nothing buffered and nothing more will come. Carries the stored
    /// error when the stream ended because of one.
    EndOfStream(Option<StreamError>),
}

/// Direction(s) a stream was opened for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Read,
    Write,
    ReadWrite,
}

impl StreamMode {
    fn of(flags: StreamFlags) -> Self {
        match (flags.readable(), flags.writable()) {
            (true, true) => StreamMode::ReadWrite,
            (false, true) => StreamMode::Write,
            _ => StreamMode::Read,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamMode::Read => "read",
            StreamMode::Write => "write",
            StreamMode::ReadWrite => "read-write",
        }
    }
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStats {
    pub size: usize,
    pub used: usize,
    pub pending: usize,
}

impl From<&BipBuffer> for BufferStats {
    fn from(buf: &BipBuffer) -> Self {
        Self {
            size: buf.size(),
            used: buf.used(),
            pending: buf.pending(),
        }
    }
}

/// Read-only view returned by [`Stream::properties`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamProperties {
    pub eof: bool,
    pub nonblocking: bool,
    pub mode: StreamMode,
    /// Inbound first, then outbound if the stream is writable
    pub buffers: Vec<BufferStats>,
}

/// Outcome of one side of a pump pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Moved,
    Blocked,
    Idle,
}

struct StreamState {
    flags: StreamFlags,
    handle: RawHandle,
    last_error: Option<i32>,
    /// Taken on close
    backing: Option<Box<dyn Backing>>,
    socket: bool,
    inbound: BipBuffer,
    outbound: Option<BipBuffer>,
}

impl StreamState {
    fn read_side(&mut self) -> Side {
        let pending = self.inbound.pending();
        if pending == 0 {
            return Side::Idle;
        }
        let handle = self.handle;
        let window = self.inbound.reserve(pending);
        if window.is_empty() {
            // Inbound full: the host has to drain it first
            return Side::Idle;
        }
        match sys::read(handle, window) {
            SysIo::Done(n) => {
                let n = self.inbound.commit(n);
                self.inbound.consume_pending(n);
                Side::Moved
            }
            SysIo::Eof => {
                ktrace!("stream fd {}: peer closed", handle);
                self.flags.insert(StreamFlags::EOF);
                Side::Idle
            }
            SysIo::WouldBlock => Side::Blocked,
            SysIo::Failed(code) => {
                self.fail(code, "read");
                Side::Idle
            }
        }
    }

    fn write_side(&mut self) -> Side {
        let handle = self.handle;
        let socket = self.socket;
        let Some(out) = self.outbound.as_mut() else {
            return Side::Idle;
        };
        let run = out.get();
        let tx = run.len().min(out.pending());
        if tx == 0 {
            return Side::Idle;
        }
        match sys::write(handle, &run[..tx], socket) {
            SysIo::Done(n) => {
                out.remove(n);
                out.consume_pending(n);
                Side::Moved
            }
            SysIo::Eof => {
                self.flags.insert(StreamFlags::EOF);
                Side::Idle
            }
            SysIo::WouldBlock => Side::Blocked,
            SysIo::Failed(code) => {
                self.fail(code, "write");
                Side::Idle
            }
        }
    }

    fn fail(&mut self, code: i32, op: &str) {
        kdebug!(
            "stream fd {}: {} failed: {}",
            self.handle,
            op,
            StreamError::Io(code)
        );
        self.last_error = Some(code);
        self.flags.insert(StreamFlags::EOF);
    }

    fn end_of_stream(&self) -> StreamError {
        match self.last_error {
            Some(code) => StreamError::Io(code),
            None => StreamError::EndOfStream,
        }
    }
}

struct StreamCore {
    this: Weak<StreamCore>,
    state: Mutex<StreamState>,
    registry: Arc<PendingOpRegistry>,
}

impl StreamCore {
    fn lock(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move bytes between the buffers and the handle until neither side
    /// makes progress or the stream ends.
    fn pump(&self, st: &mut StreamState) {
        if !is_valid_handle(st.handle) {
            return;
        }

        while !st.flags.intersects(StreamFlags::TX | StreamFlags::EOF) {
            st.flags.insert(StreamFlags::TX);
            let mut blocked = Interest::NONE;
            let mut progressed = false;

            if st.flags.readable() {
                match st.read_side() {
                    Side::Moved => progressed = true,
                    Side::Blocked => blocked = blocked | Interest::READABLE,
                    Side::Idle => {}
                }
            }
            if st.flags.writable() && !st.flags.eof() {
                match st.write_side() {
                    Side::Moved => progressed = true,
                    Side::Blocked => blocked = blocked | Interest::WRITABLE,
                    Side::Idle => {}
                }
            }

            st.flags.remove(StreamFlags::TX);

            if st.flags.nonblocking() {
                if st.flags.eof() || blocked.is_empty() {
                    self.registry.unregister(st.handle);
                } else {
                    let target: Weak<dyn PumpTarget> = self.this.clone();
                    self.registry.register(st.handle, target, blocked);
                }
            }

            if !progressed {
                break;
            }
        }
    }

    fn close(&self) {
        let mut st = self.lock();
        if !is_valid_handle(st.handle) {
            return;
        }
        if st.flags.nonblocking() {
            self.registry.unregister(st.handle);
        }
        if let Some(mut backing) = st.backing.take() {
            if let Err(code) = backing.release(st.handle) {
                kwarn!(
                    "stream fd {}: {} release failed: {}",
                    st.handle,
                    backing.kind(),
                    StreamError::Io(code)
                );
            }
        }
        ktrace!("stream fd {}: closed", st.handle);
        st.handle = INVALID_HANDLE;
    }
}

impl PumpTarget for StreamCore {
    fn pump_ready(&self) {
        let mut st = self.lock();
        self.pump(&mut st);
    }
}

/// Buffered stream over a raw handle.
///
/// Dropping the stream closes it.
pub struct Stream {
    core: Arc<StreamCore>,
}

impl Stream {
    /// Wrap `handle`.
    ///
    /// Only the READ, WRITE and NONBLOCKING bits of `flags` are honoured.
    /// A `buffer_size` of 0 uses the engine default; other values are
    /// clamped to the supported range. `backing` is the only thing that will
    /// ever release `handle`.
    pub fn wrap(
        engine: &EngineHandle,
        handle: RawHandle,
        flags: StreamFlags,
        buffer_size: usize,
        backing: Box<dyn Backing>,
    ) -> Self {
        let flags = flags.intersection(StreamFlags::CAPABILITIES);
        let size = match buffer_size {
            0 => engine.default_buffer_size(),
            n => n,
        }
        .clamp(constants::MIN_BUF_SIZE, constants::MAX_BUF_SIZE);

        let state = StreamState {
            flags,
            handle,
            last_error: None,
            socket: backing.is_socket(),
            backing: Some(backing),
            inbound: BipBuffer::new(size),
            outbound: flags.writable().then(|| BipBuffer::new(size)),
        };

        let registry = engine.registry().clone();
        let core = Arc::new_cyclic(|this| StreamCore {
            this: this.clone(),
            state: Mutex::new(state),
            registry,
        });
        ktrace!("stream fd {}: wrapped {:?}, {} byte buffers", handle, flags, size);
        Self { core }
    }

    /// Read up to `max` bytes (`None` = as much as is buffered).
    ///
    /// Runs one pump pass first. Never blocks on a non-blocking handle.
    pub fn read(&self, max: Option<usize>) -> StreamResult<ReadOutcome> {
        let mut st = self.core.lock();
        if !st.flags.readable() {
            return Err(StreamError::Unsupported(Operation::Read));
        }

        let max = max.unwrap_or(constants::MAX_BUF_SIZE);
        st.inbound.add_pending(max);
        self.core.pump(&mut st);

        let mut data = Vec::new();
        while data.len() < max {
            let run = st.inbound.get();
            if run.is_empty() {
                break;
            }
            let n = run.len().min(max - data.len());
            data.extend_from_slice(&run[..n]);
            st.inbound.remove(n);
        }

        if !data.is_empty() {
            Ok(ReadOutcome::Data(data))
        } else if st.flags.eof() || !is_valid_handle(st.handle) {
            Ok(ReadOutcome::EndOfStream(st.last_error.map(StreamError::Io)))
        } else {
            Ok(ReadOutcome::Empty)
        }
    }

    /// Queue as much of `bytes` as one contiguous reservation allows.
    ///
    /// Returns the number of bytes accepted into the outbound buffer, which
    /// may be less than `bytes.len()` (including 0 when the buffer is full).
    /// Callers resubmit the rest.
    pub fn write(&self, bytes: &[u8]) -> StreamResult<usize> {
        let mut st = self.core.lock();
        if !st.flags.writable() {
            return Err(StreamError::Unsupported(Operation::Write));
        }
        if !is_valid_handle(st.handle) {
            return Err(StreamError::Closed);
        }
        if st.flags.eof() {
            return Err(st.end_of_stream());
        }

        let Some(out) = st.outbound.as_mut() else {
            return Err(StreamError::Unsupported(Operation::Write));
        };
        let n = out.push(bytes);
        out.add_pending(n);
        self.core.pump(&mut st);
        Ok(n)
    }

    pub fn properties(&self) -> StreamProperties {
        let st = self.core.lock();
        let mut buffers = Vec::with_capacity(st.flags.buffer_count());
        buffers.push(BufferStats::from(&st.inbound));
        if let Some(out) = st.outbound.as_ref() {
            buffers.push(BufferStats::from(out));
        }
        debug_assert_eq!(buffers.len(), st.flags.buffer_count());
        StreamProperties {
            eof: st.flags.eof(),
            nonblocking: st.flags.nonblocking(),
            mode: StreamMode::of(st.flags),
            buffers,
        }
    }

    /// Stats for buffer `index` ([`INBOUND`] or [`OUTBOUND`]).
    pub fn buffer_stats(&self, index: usize) -> Option<BufferStats> {
        let st = self.core.lock();
        match index {
            INBOUND => Some(BufferStats::from(&st.inbound)),
            OUTBOUND => st.outbound.as_ref().map(BufferStats::from),
            _ => None,
        }
    }

    /// Release the handle. Idempotent.
    pub fn close(&self) {
        self.core.close();
    }

    pub fn is_closed(&self) -> bool {
        !is_valid_handle(self.core.lock().handle)
    }

    /// Underlying handle ([`INVALID_HANDLE`] once closed)
    pub fn handle(&self) -> RawHandle {
        self.core.lock().handle
    }

    pub fn flags(&self) -> StreamFlags {
        self.core.lock().flags
    }

    /// Stored OS error, if a transfer failed
    pub fn last_error(&self) -> Option<StreamError> {
        self.core.lock().last_error.map(StreamError::Io)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.core.lock();
        f.debug_struct("Stream")
            .field("handle", &st.handle)
            .field("flags", &st.flags)
            .field("last_error", &st.last_error)
            .finish()
    }
}
