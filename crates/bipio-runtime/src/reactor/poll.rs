//! `poll(2)` readiness backend.

use std::io;

use super::{Readiness, ReadinessBackend, WatchSet};

/// Level-triggered backend over `poll(2)`.
///
/// The `pollfd` array is kept between waits and resized with the watch set.
#[derive(Default)]
pub struct PollBackend {
    fds: Vec<libc::pollfd>,
}

impl PollBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn events_for(interest: crate::registry::Interest) -> libc::c_short {
    let mut events = 0;
    if interest.is_readable() {
        events |= libc::POLLIN;
    }
    if interest.is_writable() {
        events |= libc::POLLOUT;
    }
    events
}

fn readiness_of(revents: libc::c_short) -> Readiness {
    let mut ready = Readiness::empty();
    if revents & libc::POLLIN != 0 {
        ready.insert(Readiness::READABLE);
    }
    if revents & libc::POLLOUT != 0 {
        ready.insert(Readiness::WRITABLE);
    }
    if revents & libc::POLLHUP != 0 {
        ready.insert(Readiness::HANGUP);
    }
    if revents & libc::POLLERR != 0 {
        ready.insert(Readiness::ERROR);
    }
    if revents & libc::POLLNVAL != 0 {
        ready.insert(Readiness::INVALID);
    }
    ready
}

impl ReadinessBackend for PollBackend {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn wait(&mut self, set: &mut WatchSet) -> io::Result<usize> {
        self.fds.clear();
        if self.fds.capacity() >= set.capacity().saturating_mul(2) {
            self.fds.shrink_to(set.capacity());
        }
        self.fds.extend(set.watches().iter().map(|w| libc::pollfd {
            fd: w.handle,
            events: events_for(w.interest),
            revents: 0,
        }));

        let ret = unsafe { libc::poll(self.fds.as_mut_ptr(), self.fds.len() as libc::nfds_t, -1) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        for (watch, pfd) in set.watches_mut().iter_mut().zip(&self.fds) {
            watch.ready = readiness_of(pfd.revents);
        }
        Ok(ret as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Interest;
    use crate::sys::{self, tests::socket_pair};

    #[test]
    fn test_reports_readable_and_writable() {
        let (a, b) = socket_pair();
        let mut backend = PollBackend::new();
        let mut set = WatchSet::with_capacity(2);

        // Nothing to read yet, but always writable
        set.push(a, Interest::READABLE | Interest::WRITABLE);
        assert_eq!(backend.wait(&mut set).unwrap(), 1);
        let ready = set.watches()[0].ready;
        assert!(ready.contains(Readiness::WRITABLE));
        assert!(!ready.contains(Readiness::READABLE));

        assert_eq!(sys::write(b, b"x", true), sys::SysIo::Done(1));
        set.clear();
        set.push(a, Interest::READABLE);
        backend.wait(&mut set).unwrap();
        assert!(set.watches()[0].ready.contains(Readiness::READABLE));

        sys::close(a).unwrap();
        sys::close(b).unwrap();
    }

    #[test]
    fn test_reports_hangup() {
        let (a, b) = socket_pair();
        sys::close(b).unwrap();

        let mut backend = PollBackend::new();
        let mut set = WatchSet::with_capacity(1);
        set.push(a, Interest::READABLE);
        backend.wait(&mut set).unwrap();
        assert!(set.watches()[0].ready.contains(Readiness::HANGUP));

        sys::close(a).unwrap();
    }

    #[test]
    fn test_name() {
        assert_eq!(PollBackend::new().name(), "poll");
    }
}
