//! PendingOpRegistry - handles currently waiting for readiness
//!
//! Maps a raw handle to a weak reference of the stream that owns it, plus
//! the directions that stream is blocked on. Streams insert themselves from
//! their pump when a transfer would block and remove themselves once no
//! side is blocked (or on close). Every real membership change pokes the
//! reactor through the [`Notifier`] so it rebuilds its watch set.
//!
//! # Locking
//!
//! One mutex guards the map. Callers reach it while holding their own
//! stream lock (stream -> registry). The reactor only ever holds the
//! registry lock on its own: it snapshots under the lock, drops it, and
//! then pumps.

use std::collections::HashMap;
use std::fmt;
use std::ops::BitOr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bipio_core::{kwarn, ktrace, RawHandle};

use crate::reactor::WatchSet;
use crate::wake::Notifier;

/// Something the reactor can drive when its handle becomes ready.
pub trait PumpTarget: Send + Sync {
    /// Run one pump pass. Must not block on a non-blocking handle.
    fn pump_ready(&self);
}

/// Directions a registered handle is blocked on
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interest(u8);

impl Interest {
    pub const NONE: Self = Self(0);
    pub const READABLE: Self = Self(1);
    pub const WRITABLE: Self = Self(2);

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_readable(self) -> bool {
        self.0 & Self::READABLE.0 != 0
    }

    #[inline]
    pub const fn is_writable(self) -> bool {
        self.0 & Self::WRITABLE.0 != 0
    }
}

impl BitOr for Interest {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_readable(), self.is_writable()) {
            (true, true) => write!(f, "Interest(READABLE | WRITABLE)"),
            (true, false) => write!(f, "Interest(READABLE)"),
            (false, true) => write!(f, "Interest(WRITABLE)"),
            (false, false) => write!(f, "Interest(NONE)"),
        }
    }
}

struct Entry {
    target: Weak<dyn PumpTarget>,
    interest: Interest,
}

/// Shared table of handles the reactor should watch.
pub struct PendingOpRegistry {
    entries: Mutex<HashMap<RawHandle, Entry>>,
    notifier: Arc<dyn Notifier>,
}

impl PendingOpRegistry {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            notifier,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RawHandle, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn signal(&self) {
        if let Err(code) = self.notifier.notify() {
            kwarn!("registry: wake signal failed: errno {}", code);
        }
    }

    // ========================================================================
    // Membership
    // ========================================================================

    /// Insert or update `handle`. Returns `true` if membership changed.
    ///
    /// Re-registering the same target with the same interest is a no-op and
    /// does not wake the reactor.
    pub fn register(
        &self,
        handle: RawHandle,
        target: Weak<dyn PumpTarget>,
        interest: Interest,
    ) -> bool {
        let mut entries = self.lock();
        let changed = match entries.get(&handle) {
            Some(entry) => entry.interest != interest || !Weak::ptr_eq(&entry.target, &target),
            None => true,
        };
        if changed {
            ktrace!("registry: watch fd {} for {:?}", handle, interest);
            entries.insert(handle, Entry { target, interest });
            self.signal();
        }
        changed
    }

    /// Remove `handle`. Returns `true` if it was present.
    pub fn unregister(&self, handle: RawHandle) -> bool {
        let mut entries = self.lock();
        let removed = entries.remove(&handle).is_some();
        if removed {
            ktrace!("registry: unwatch fd {}", handle);
            self.signal();
        }
        removed
    }

    pub fn contains(&self, handle: RawHandle) -> bool {
        self.lock().contains_key(&handle)
    }

    /// Current interest for `handle`, if registered
    pub fn interest(&self, handle: RawHandle) -> Option<Interest> {
        self.lock().get(&handle).map(|e| e.interest)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // ========================================================================
    // Reactor side
    // ========================================================================

    /// Rebuild `set`: the wake handle first, then every registered handle.
    pub(crate) fn fill_watch_set(&self, wake: RawHandle, set: &mut WatchSet) {
        let entries = self.lock();
        set.clear();
        set.ensure_capacity(entries.len() + 1);
        set.push(wake, Interest::READABLE);
        for (&handle, entry) in entries.iter() {
            set.push(handle, entry.interest);
        }
    }

    /// Resolve ready handles to live targets.
    ///
    /// Entries whose stream has already been dropped are pruned. The caller
    /// runs the targets after this returns, with the lock released.
    pub(crate) fn collect_ready(&self, handles: &[RawHandle], out: &mut Vec<Arc<dyn PumpTarget>>) {
        let mut entries = self.lock();
        for handle in handles {
            let Some(entry) = entries.get(handle) else {
                // Unregistered between WAIT and DISPATCH
                continue;
            };
            match entry.target.upgrade() {
                Some(target) => out.push(target),
                None => {
                    entries.remove(handle);
                }
            }
        }
    }
}

impl fmt::Debug for PendingOpRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOpRegistry")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Notifier that only counts.
    #[derive(Default)]
    pub(crate) struct CountingNotifier {
        pub(crate) count: AtomicUsize,
    }

    impl CountingNotifier {
        pub(crate) fn get(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }
    }

    impl Notifier for CountingNotifier {
        fn notify(&self) -> Result<(), i32> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Probe {
        pumps: AtomicUsize,
    }

    impl PumpTarget for Probe {
        fn pump_ready(&self) {
            self.pumps.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn weak_of(probe: &Arc<Probe>) -> Weak<dyn PumpTarget> {
        let target: Arc<dyn PumpTarget> = probe.clone();
        Arc::downgrade(&target)
    }

    fn setup() -> (Arc<CountingNotifier>, PendingOpRegistry) {
        let notifier = Arc::new(CountingNotifier::default());
        let registry = PendingOpRegistry::new(notifier.clone());
        (notifier, registry)
    }

    #[test]
    fn test_register_signals_only_on_change() {
        let (notifier, registry) = setup();
        let probe = Arc::new(Probe::default());

        assert!(registry.register(7, weak_of(&probe), Interest::READABLE));
        assert_eq!(notifier.get(), 1);

        // Same target, same interest
        assert!(!registry.register(7, weak_of(&probe), Interest::READABLE));
        assert_eq!(notifier.get(), 1);

        // Interest widened
        assert!(registry.register(7, weak_of(&probe), Interest::READABLE | Interest::WRITABLE));
        assert_eq!(notifier.get(), 2);
        assert_eq!(
            registry.interest(7),
            Some(Interest::READABLE | Interest::WRITABLE)
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_idempotent() {
        let (notifier, registry) = setup();
        let probe = Arc::new(Probe::default());

        assert!(!registry.unregister(3));
        assert_eq!(notifier.get(), 0);

        registry.register(3, weak_of(&probe), Interest::WRITABLE);
        assert!(registry.contains(3));
        assert!(registry.unregister(3));
        assert!(!registry.unregister(3));
        assert_eq!(notifier.get(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_fill_watch_set_puts_wake_first() {
        let (_notifier, registry) = setup();
        let probe = Arc::new(Probe::default());
        registry.register(10, weak_of(&probe), Interest::READABLE);
        registry.register(11, weak_of(&probe), Interest::WRITABLE);

        let mut set = WatchSet::with_capacity(1);
        registry.fill_watch_set(99, &mut set);

        assert_eq!(set.len(), 3);
        assert_eq!(set.watches()[0].handle, 99);
        assert!(set.watches()[0].interest.is_readable());

        let mut rest: Vec<_> = set.watches()[1..].iter().map(|w| w.handle).collect();
        rest.sort();
        assert_eq!(rest, vec![10, 11]);
    }

    #[test]
    fn test_collect_ready_prunes_dead_targets() {
        let (_notifier, registry) = setup();
        let live = Arc::new(Probe::default());
        let dead = Arc::new(Probe::default());
        registry.register(1, weak_of(&live), Interest::READABLE);
        registry.register(2, weak_of(&dead), Interest::READABLE);
        drop(dead);

        let mut out = Vec::new();
        registry.collect_ready(&[1, 2, 5], &mut out);
        assert_eq!(out.len(), 1);
        assert!(registry.contains(1));
        assert!(!registry.contains(2));

        for target in out {
            target.pump_ready();
        }
        assert_eq!(live.pumps.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_interest_debug() {
        assert_eq!(format!("{:?}", Interest::NONE), "Interest(NONE)");
        assert_eq!(
            format!("{:?}", Interest::READABLE | Interest::WRITABLE),
            "Interest(READABLE | WRITABLE)"
        );
        assert!(Interest::default().is_empty());
    }
}
