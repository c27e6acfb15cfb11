//! # bipio - embeddable non-blocking byte-stream engine
//!
//! Multiplexes many socket-like handles on one background thread, buffers
//! bytes in bip buffers, and gives the host synchronous-looking
//! `read`/`write` calls that never block on a non-blocking handle.
//!
//! ## Quick Start
//!
//! ```ignore
//! use bipio::prelude::*;
//!
//! fn main() -> Result<(), SetupError> {
//!     let engine = Engine::start(EngineConfig::from_env())?;
//!     let listener = Socket::create(&engine.handle(), Protocol::Tcp)?;
//!     listener.listen("127.0.0.1", 9999, None)?;
//!
//!     loop {
//!         if let Some(conn) = listener.accept()? {
//!             match conn.read(Some(1024)) {
//!                 Ok(ReadOutcome::Data(bytes)) => { conn.write(&bytes).ok(); }
//!                 Ok(ReadOutcome::Empty) => {}
//!                 Ok(ReadOutcome::EndOfStream(_)) | Err(_) => conn.close(),
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |                         Host code                           |
//! |        Stream::read / write / properties / close            |
//! +-------------------------------------------------------------+
//!          |                                    ^
//!          v                                    |
//! +-------------------+   register/unregister   +---------------+
//! |  Stream (+ pump)  | ----------------------> |   Pending-op  |
//! |  inbound  bip buf |                         |   registry    |
//! |  outbound bip buf | <--- pump_ready() ----- +---------------+
//! +-------------------+          |                     | wake byte
//!          |                     |                     v
//!          v               +-----------------------------------+
//!      OS handle           |   Reactor thread (poll backend)   |
//!                          +-----------------------------------+
//! ```
//!
//! ## Crates
//!
//! - `bipio-core`: bip buffer, flags, errors, logging (no syscalls)
//! - `bipio-runtime`: streams, registry, reactor, sockets, engine

// Re-export core types
pub use bipio_core::{
    constants, env_get, env_get_bool, env_get_opt, env_get_str, Backing, BipBuffer, ConfigError,
    Operation, RawHandle, SetupError, SetupResult, StreamError, StreamFlags, StreamResult,
    INVALID_HANDLE,
};
pub use bipio_core::kprint;
pub use bipio_core::{kdebug, kerror, kinfo, kprintln, ktrace, kwarn};

// Re-export runtime
pub use bipio_runtime::{
    set_nonblocking, BufferStats, Connection, Descriptor, Detached, Engine, EngineConfig,
    EngineHandle, Interest, Listener, Notifier, PendingOpRegistry, PollBackend, Protocol,
    PumpTarget, ReactorStats, ReactorThread, ReadOutcome, ReadinessBackend, Socket, Stream,
    StreamMode, StreamProperties, UnknownProtocol, WakeChannel, WatchSet,
};

/// Commonly used types
pub mod prelude {
    pub use crate::{
        Engine, EngineConfig, EngineHandle, Protocol, ReadOutcome, SetupError, Socket, Stream,
        StreamError, StreamFlags,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::thread;
    use std::time::Duration;

    /// Full path: engine, listener, accepted stream, reactor-driven I/O.
    #[test]
    fn test_loopback_echo() {
        let engine = Engine::start(EngineConfig::new().thread_name("bipio-test")).unwrap();
        let listener = Socket::create(&engine.handle(), Protocol::Tcp).unwrap();
        listener.listen("127.0.0.1", 0, None).unwrap();
        let addr = listener.local_addr().unwrap();

        let client = thread::spawn(move || {
            let mut conn = TcpStream::connect(addr).unwrap();
            conn.write_all(b"hello bipio").unwrap();
            let mut reply = [0u8; 11];
            conn.read_exact(&mut reply).unwrap();
            reply
        });

        let mut stream = None;
        for _ in 0..1000 {
            stream = listener.accept().unwrap();
            if stream.is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        let stream = stream.expect("no connection");

        let mut echoed = 0;
        for _ in 0..1000 {
            match stream.read(Some(64)).unwrap() {
                ReadOutcome::Data(bytes) => {
                    let mut off = 0;
                    while off < bytes.len() {
                        off += stream.write(&bytes[off..]).unwrap();
                    }
                    echoed += bytes.len();
                }
                ReadOutcome::Empty => thread::sleep(Duration::from_millis(2)),
                ReadOutcome::EndOfStream(e) => panic!("unexpected end of stream: {:?}", e),
            }
            if echoed == 11 {
                break;
            }
        }

        assert_eq!(&client.join().unwrap(), b"hello bipio");
        drop(stream);
        drop(listener);

        let mut engine = engine;
        let stats = engine.shutdown();
        assert!(stats.iterations >= 1);
    }
}
