//! Reactor thread
//!
//! One background thread that waits for readiness on the wake channel plus
//! every registered handle, and pumps the streams whose handles are ready.
//!
//! # Loop
//!
//! ```text
//!            +--------------------------------------------+
//!            v                                            |
//!   WAIT:  lock registry, rebuild watch set, unlock       |
//!          backend.wait()  (blocks)                       |
//!            |                                            |
//!            +-- wake readable --> drain --> hung up? --> exit
//!            |                                 |no        |
//!            v<--------------------------------+          |
//!   DISPATCH: lock registry, resolve ready handles, unlock|
//!             pump each target (takes its stream lock)  --+
//! ```
//!
//! The registry lock is never held while a pump runs, so a pump can
//! register or unregister its own handle without re-entering the lock.
//!
//! The readiness mechanism is a [`ReadinessBackend`]. `poll(2)` is the
//! default on unix.

pub mod poll;

use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bipio_core::{kdebug, kerror, kinfo, RawHandle, SetupError, SetupResult};

use crate::config::EngineConfig;
use crate::registry::{Interest, PendingOpRegistry, PumpTarget};
use crate::wake::{Drain, WakeChannel};

pub use poll::PollBackend;

/// Readiness reported for one watched handle
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness(u8);

impl Readiness {
    pub const READABLE: Self = Self(1 << 0);
    pub const WRITABLE: Self = Self(1 << 1);
    pub const HANGUP: Self = Self(1 << 2);
    pub const ERROR: Self = Self(1 << 3);
    /// Handle is not open
    pub const INVALID: Self = Self(1 << 4);

    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl fmt::Debug for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Readiness, &str); 5] = [
            (Readiness::READABLE, "READABLE"),
            (Readiness::WRITABLE, "WRITABLE"),
            (Readiness::HANGUP, "HANGUP"),
            (Readiness::ERROR, "ERROR"),
            (Readiness::INVALID, "INVALID"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Readiness({})", names.join(" | "))
    }
}

/// One entry of the watch set
#[derive(Debug, Clone, Copy)]
pub struct Watch {
    pub handle: RawHandle,
    pub interest: Interest,
    /// Filled in by the backend
    pub ready: Readiness,
}

/// Handles the reactor waits on. Entry 0 is always the wake channel.
///
/// Capacity grows geometrically (by half again) and is only given back
/// once it is at least twice the current need, never dropping below it.
#[derive(Debug)]
pub struct WatchSet {
    watches: Vec<Watch>,
    min_capacity: usize,
}

impl WatchSet {
    pub fn with_capacity(capacity: usize) -> Self {
        let min_capacity = capacity.max(1);
        Self {
            watches: Vec::with_capacity(min_capacity),
            min_capacity,
        }
    }

    pub fn clear(&mut self) {
        self.watches.clear();
    }

    /// Make room for `need` watches.
    pub fn ensure_capacity(&mut self, need: usize) {
        let cap = self.watches.capacity();
        if cap < need {
            let target = need + need / 2;
            self.watches.reserve_exact(target - self.watches.len());
            kdebug!("reactor: watch set grown {} -> {}", cap, self.watches.capacity());
        } else if cap >= need.saturating_mul(2) && cap > self.min_capacity {
            let target = (need + need / 2).max(self.min_capacity);
            self.watches.shrink_to(target);
        }
    }

    pub fn push(&mut self, handle: RawHandle, interest: Interest) {
        self.watches.push(Watch {
            handle,
            interest,
            ready: Readiness::empty(),
        });
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.watches.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.watches.capacity()
    }

    pub fn watches(&self) -> &[Watch] {
        &self.watches
    }

    pub fn watches_mut(&mut self) -> &mut [Watch] {
        &mut self.watches
    }
}

/// Readiness multiplexing backend.
///
/// Implementations block until at least one watch is ready, then fill in
/// `Watch::ready` for every entry. The buffering and registry logic does
/// not depend on which backend is used.
pub trait ReadinessBackend: Send {
    /// Backend name (for logging)
    fn name(&self) -> &'static str;

    /// Block until something in `set` is ready. Returns the ready count.
    fn wait(&mut self, set: &mut WatchSet) -> io::Result<usize>;
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        /// Backend used when none is supplied
        pub fn default_backend() -> Box<dyn ReadinessBackend> {
            Box::new(PollBackend::new())
        }
    } else {
        compile_error!("bipio-runtime needs a readiness backend for this platform");
    }
}

/// Statistics from reactor execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactorStats {
    /// Total WAIT phases entered
    pub iterations: u64,

    /// Times the wake channel fired
    pub wakeups: u64,

    /// Total pump dispatches
    pub dispatches: u64,

    /// Largest watch set, wake channel included
    pub peak_watch: usize,
}

/// Handle to a running reactor thread
pub struct ReactorThread {
    handle: JoinHandle<ReactorStats>,
}

impl ReactorThread {
    /// Spawn the reactor.
    ///
    /// The thread runs until the wake channel is hung up.
    pub fn spawn(
        registry: Arc<PendingOpRegistry>,
        wake: Arc<WakeChannel>,
        backend: Box<dyn ReadinessBackend>,
        config: &EngineConfig,
    ) -> SetupResult<Self> {
        let mut builder = thread::Builder::new().name(config.thread_name.clone());

        if let Some(stack_size) = config.thread_stack_size {
            builder = builder.stack_size(stack_size);
        }

        let watch_capacity = config.watch_capacity;
        let handle = builder
            .spawn(move || reactor_loop(registry, wake, backend, watch_capacity))
            .map_err(|e| SetupError::ReactorSpawn(e.to_string()))?;

        Ok(Self { handle })
    }

    /// Wait for the thread to exit. `None` if it panicked.
    ///
    /// Hang up the wake channel first or this blocks forever.
    pub fn join(self) -> Option<ReactorStats> {
        match self.handle.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                kerror!("reactor thread panicked");
                None
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Main reactor loop
fn reactor_loop(
    registry: Arc<PendingOpRegistry>,
    wake: Arc<WakeChannel>,
    mut backend: Box<dyn ReadinessBackend>,
    watch_capacity: usize,
) -> ReactorStats {
    let mut stats = ReactorStats::default();
    let mut set = WatchSet::with_capacity(watch_capacity);
    let mut ready: Vec<RawHandle> = Vec::new();
    let mut targets: Vec<Arc<dyn PumpTarget>> = Vec::new();
    let wake_fd = wake.reader_handle();

    kinfo!("reactor started (backend: {})", backend.name());

    loop {
        // ── WAIT ──
        registry.fill_watch_set(wake_fd, &mut set);
        stats.iterations += 1;
        stats.peak_watch = stats.peak_watch.max(set.len());

        match backend.wait(&mut set) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                kerror!("reactor: {} wait failed: {}", backend.name(), e);
                break;
            }
        }

        let wake_ready = set.watches()[0].ready;
        if wake_ready.contains(Readiness::READABLE) {
            stats.wakeups += 1;
            if let Drain::HungUp = wake.drain() {
                break;
            }
        } else if !wake_ready.is_empty() {
            // Hang-up (or error) with nothing left to read
            break;
        }

        // ── DISPATCH ──
        ready.clear();
        ready.extend(
            set.watches()[1..]
                .iter()
                .filter(|w| !w.ready.is_empty())
                .map(|w| w.handle),
        );
        registry.collect_ready(&ready, &mut targets);

        for target in targets.drain(..) {
            target.pump_ready();
            stats.dispatches += 1;
        }
    }

    kdebug!(
        "reactor stopped: {} iterations, {} wakeups, {} dispatches, peak watch {}",
        stats.iterations,
        stats.wakeups,
        stats.dispatches,
        stats.peak_watch
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use crate::sys::{self, tests::socket_pair};

    #[test]
    fn test_watch_set_growth_and_shrink() {
        let mut set = WatchSet::with_capacity(4);
        assert!(set.capacity() >= 4);

        set.ensure_capacity(10);
        assert!(set.capacity() >= 15);

        // Slightly smaller need keeps the allocation
        let cap = set.capacity();
        set.ensure_capacity(9);
        assert_eq!(set.capacity(), cap);

        // Far smaller need gives some back, but never below the need
        set.ensure_capacity(2);
        assert!(set.capacity() >= 4);
        assert!(set.capacity() < cap);

        for h in 0..40 {
            set.ensure_capacity(set.len() + 1);
            set.push(h, Interest::READABLE);
        }
        assert_eq!(set.len(), 40);
        set.ensure_capacity(40);
        assert!(set.capacity() >= 40);
    }

    #[test]
    fn test_readiness_debug() {
        let mut r = Readiness::empty();
        r.insert(Readiness::READABLE);
        r.insert(Readiness::HANGUP);
        assert_eq!(format!("{:?}", r), "Readiness(READABLE | HANGUP)");
        assert!(r.contains(Readiness::HANGUP));
        assert!(!r.contains(Readiness::WRITABLE));
    }

    #[derive(Default)]
    struct Counter {
        pumps: AtomicUsize,
        fd: AtomicUsize,
        registry: std::sync::OnceLock<Arc<PendingOpRegistry>>,
    }

    impl PumpTarget for Counter {
        fn pump_ready(&self) {
            self.pumps.fetch_add(1, Ordering::SeqCst);
            // Drain and stop watching, as a stream would
            let fd = self.fd.load(Ordering::SeqCst) as RawHandle;
            let mut buf = [0u8; 64];
            while let sys::SysIo::Done(_) = sys::read(fd, &mut buf) {}
            if let Some(registry) = self.registry.get() {
                registry.unregister(fd);
            }
        }
    }

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
    fn test_dispatch_and_shutdown() {
        let wake = Arc::new(WakeChannel::new().unwrap());
        let registry = Arc::new(PendingOpRegistry::new(wake.clone()));
        let config = EngineConfig::new().thread_name("reactor-test");
        let reactor = ReactorThread::spawn(
            registry.clone(),
            wake.clone(),
            default_backend(),
            &config,
        )
        .unwrap();

        let (a, b) = socket_pair();
        let counter = Arc::new(Counter::default());
        counter.fd.store(a as usize, Ordering::SeqCst);
        let _ = counter.registry.set(registry.clone());

        let target: Arc<dyn PumpTarget> = counter.clone();
        registry.register(a, Arc::downgrade(&target), Interest::READABLE);

        assert_eq!(sys::write(b, b"hello", true), sys::SysIo::Done(5));
        assert!(wait_until(|| counter.pumps.load(Ordering::SeqCst) >= 1));
        assert!(wait_until(|| !registry.contains(a)));

        wake.hang_up();
        let stats = reactor.join().unwrap();
        assert!(stats.dispatches >= 1);
        assert!(stats.wakeups >= 1);
        assert!(stats.peak_watch >= 2);

        sys::close(a).unwrap();
        sys::close(b).unwrap();
    }

    #[test]
    fn test_wake_and_stream_ready_together_dispatch_in_one_pass() {
        let wake = Arc::new(WakeChannel::new().unwrap());
        let registry = Arc::new(PendingOpRegistry::new(wake.clone()));

        // Registering writes a wake byte; the peer's data makes `a` ready too
        let (a, b) = socket_pair();
        let counter = Arc::new(Counter::default());
        counter.fd.store(a as usize, Ordering::SeqCst);
        let target: Arc<dyn PumpTarget> = counter.clone();
        assert!(registry.register(a, Arc::downgrade(&target), Interest::READABLE));
        assert_eq!(sys::write(b, b"ping", true), sys::SysIo::Done(4));

        let reactor = ReactorThread::spawn(
            registry.clone(),
            wake.clone(),
            default_backend(),
            &EngineConfig::new(),
        )
        .unwrap();

        assert!(wait_until(|| counter.pumps.load(Ordering::SeqCst) >= 1));
        wake.hang_up();
        let stats = reactor.join().unwrap();

        // First wait: wake drained and `a` pumped. Second wait: hang-up.
        assert_eq!(stats.iterations, 2);
        assert!(stats.wakeups >= 1);
        assert_eq!(stats.dispatches, 1);

        sys::close(a).unwrap();
        sys::close(b).unwrap();
    }

    #[test]
    fn test_hang_up_stops_idle_reactor() {
        let wake = Arc::new(WakeChannel::new().unwrap());
        let registry = Arc::new(PendingOpRegistry::new(wake.clone()));
        let reactor = ReactorThread::spawn(
            registry,
            wake.clone(),
            default_backend(),
            &EngineConfig::new(),
        )
        .unwrap();

        wake.hang_up();
        let stats = reactor.join().unwrap();
        assert_eq!(stats.dispatches, 0);
        assert_eq!(stats.peak_watch, 1);
    }
}
