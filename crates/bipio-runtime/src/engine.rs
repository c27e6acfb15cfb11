//! Engine lifecycle
//!
//! [`Engine`] owns the wake channel and the reactor thread. Everything that
//! creates streams gets an [`EngineHandle`] instead of reaching for a global,
//! so several engines (e.g. one per test) can coexist in one process.
//!
//! ```rust,ignore
//! let engine = Engine::start(EngineConfig::from_env())?;
//! let listener = Socket::create(&engine.handle(), Protocol::Tcp)?;
//! // ...
//! let stats = engine.shutdown();
//! ```

use std::sync::Arc;

use bipio_core::{kinfo, Backing, RawHandle, SetupResult, StreamFlags};

use crate::config::EngineConfig;
use crate::reactor::{default_backend, ReactorStats, ReactorThread, ReadinessBackend};
use crate::registry::PendingOpRegistry;
use crate::stream::Stream;
use crate::wake::WakeChannel;

/// Cloneable reference to a running engine's shared state.
#[derive(Clone)]
pub struct EngineHandle {
    registry: Arc<PendingOpRegistry>,
    config: Arc<EngineConfig>,
}

impl EngineHandle {
    pub(crate) fn new(registry: Arc<PendingOpRegistry>, config: EngineConfig) -> Self {
        Self {
            registry,
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &Arc<PendingOpRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn default_buffer_size(&self) -> usize {
        self.config.default_buffer_size
    }

    /// Wrap a raw handle in a [`Stream`] bound to this engine.
    pub fn wrap_handle<B>(
        &self,
        handle: RawHandle,
        flags: StreamFlags,
        buffer_size: usize,
        backing: B,
    ) -> Stream
    where
        B: Backing + 'static,
    {
        Stream::wrap(self, handle, flags, buffer_size, Box::new(backing))
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("registry", &self.registry)
            .finish()
    }
}

/// Running engine: wake channel + reactor thread.
///
/// Dropping the engine shuts it down.
pub struct Engine {
    handle: EngineHandle,
    wake: Arc<WakeChannel>,
    reactor: Option<ReactorThread>,
}

impl Engine {
    /// Validate `config`, allocate the wake channel and start the reactor.
    pub fn start(config: EngineConfig) -> SetupResult<Self> {
        Self::start_with_backend(config, default_backend())
    }

    /// Like [`start`](Self::start) with an explicit readiness backend.
    pub fn start_with_backend(
        config: EngineConfig,
        backend: Box<dyn ReadinessBackend>,
    ) -> SetupResult<Self> {
        config.validate()?;

        let wake = Arc::new(WakeChannel::new()?);
        let registry = Arc::new(PendingOpRegistry::new(wake.clone()));
        let backend_name = backend.name();
        let reactor = ReactorThread::spawn(registry.clone(), wake.clone(), backend, &config)?;

        kinfo!(
            "engine started: backend={}, thread={}, buffer={}",
            backend_name,
            config.thread_name,
            config.default_buffer_size
        );

        Ok(Self {
            handle: EngineHandle::new(registry, config),
            wake,
            reactor: Some(reactor),
        })
    }

    /// Handle for creating streams and sockets.
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        self.handle.config()
    }

    pub fn is_running(&self) -> bool {
        self.reactor.is_some()
    }

    /// Hang up the wake channel and join the reactor.
    ///
    /// Idempotent: later calls return default stats. Streams still alive
    /// stay usable for buffered I/O but nothing drives them in the
    /// background any more.
    pub fn shutdown(&mut self) -> ReactorStats {
        let Some(reactor) = self.reactor.take() else {
            return ReactorStats::default();
        };
        self.wake.hang_up();
        let stats = reactor.join().unwrap_or_default();
        kinfo!(
            "engine stopped: {} iterations, {} dispatches",
            stats.iterations,
            stats.dispatches
        );
        stats
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    use bipio_core::{ConfigError, SetupError};

    use crate::backing::Descriptor;
    use crate::stream::ReadOutcome;
    use crate::sys::{self, tests::socket_pair, SysIo};

    const RW_NB: StreamFlags = StreamFlags::READ
        .union(StreamFlags::WRITE)
        .union(StreamFlags::NONBLOCKING);

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn test_start_rejects_bad_config() {
        let result = Engine::start(EngineConfig::new().default_buffer_size(1));
        assert!(matches!(
            result,
            Err(SetupError::Config(ConfigError::InvalidValue(_)))
        ));
    }

    #[test]
    fn test_shutdown_idempotent() {
        let mut engine = Engine::start(EngineConfig::new()).unwrap();
        assert!(engine.is_running());
        let stats = engine.shutdown();
        assert!(stats.iterations >= 1);
        assert!(!engine.is_running());
        assert_eq!(engine.shutdown(), ReactorStats::default());
    }

    #[test]
    fn test_reactor_fills_inbound_in_background() {
        let engine = Engine::start(EngineConfig::new()).unwrap();
        let (a, b) = socket_pair();
        let stream = engine.handle().wrap_handle(a, RW_NB, 64, Descriptor);

        // Ask for data before any exists: the stream parks in the registry
        assert_eq!(stream.read(Some(0)), Ok(ReadOutcome::Empty));
        assert_eq!(stream.read(Some(5)), Ok(ReadOutcome::Empty));
        assert!(engine.handle().registry().contains(a));

        assert_eq!(sys::write(b, b"hello", true), SysIo::Done(5));

        // The reactor pulls the bytes in without another read()
        assert!(wait_until(|| {
            stream.buffer_stats(bipio_core::constants::INBOUND).unwrap().used == 5
        }));
        assert!(wait_until(|| !engine.handle().registry().contains(a)));
        assert_eq!(stream.read(Some(5)), Ok(ReadOutcome::Data(b"hello".to_vec())));

        drop(stream);
        sys::close(b).unwrap();
    }

    #[test]
    fn test_reactor_flushes_outbound_when_peer_drains() {
        let engine = Engine::start(EngineConfig::new()).unwrap();
        let (a, b) = socket_pair();
        let stream = engine.handle().wrap_handle(a, RW_NB, 64 * 1024, Descriptor);

        // Fill the socket until the stream has to hold bytes back
        let chunk = vec![0x5au8; 16 * 1024];
        let mut accepted = 0usize;
        for _ in 0..256 {
            accepted += stream.write(&chunk).unwrap();
            if engine.handle().registry().contains(a) {
                break;
            }
        }
        assert!(engine.handle().registry().contains(a), "socket never filled");

        // Drain the peer; the reactor must push the rest out
        let mut received = 0usize;
        let mut buf = vec![0u8; 64 * 1024];
        let drained = wait_until(|| {
            while let SysIo::Done(n) = sys::read(b, &mut buf) {
                received += n;
            }
            received == accepted
        });
        assert!(drained, "received {} of {}", received, accepted);
        assert!(wait_until(|| !engine.handle().registry().contains(a)));

        drop(stream);
        sys::close(b).unwrap();
    }
}
