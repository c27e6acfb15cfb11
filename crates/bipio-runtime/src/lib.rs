//! # bipio-runtime
//!
//! OS-facing half of the bipio byte-stream engine.
//!
//! This crate provides:
//! - `Stream`: buffered read/write over a raw handle, driven by a pump
//! - `PendingOpRegistry`: handles waiting for readiness
//! - `ReactorThread`: background thread that pumps ready handles
//! - `Socket`: non-blocking IPv4 socket factory
//! - `Engine`: wake channel + reactor lifecycle
//!
//! ```text
//!   host thread                         reactor thread
//!   -----------                         --------------
//!   Stream::read/write                  poll(wake + registered fds)
//!     | pump (stream lock)                 |
//!     |   would block?                     | wake fd: drain, rebuild
//!     v                                    | ready fd: pump_ready()
//!   PendingOpRegistry  --- wake byte --->  |
//!     (registry lock)  <-- snapshot -------+
//! ```

pub mod backing;
pub mod config;
pub mod engine;
pub mod reactor;
pub mod registry;
pub mod socket;
pub mod stream;
pub mod wake;

mod sys;

// Re-exports
pub use backing::{Connection, Descriptor, Detached, Listener};
pub use config::EngineConfig;
pub use engine::{Engine, EngineHandle};
pub use reactor::{PollBackend, ReactorStats, ReactorThread, ReadinessBackend, WatchSet};
pub use registry::{Interest, PendingOpRegistry, PumpTarget};
pub use socket::{Protocol, Socket, UnknownProtocol};
pub use stream::{BufferStats, ReadOutcome, Stream, StreamMode, StreamProperties};
pub use sys::set_nonblocking;
pub use wake::{Notifier, WakeChannel};

// Platform detection
cfg_if::cfg_if! {
    if #[cfg(not(unix))] {
        compile_error!("Unsupported platform: bipio-runtime needs a unix poll(2)");
    }
}
