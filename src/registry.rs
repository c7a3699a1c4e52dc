use crate::events::Events;

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::Arc;

/// One registered descriptor.
///
/// Holding `token` keeps the caller's resource alive for as long as the
/// kernel may report it.
pub(crate) struct Registration<T: ?Sized> {
    pub(crate) events: Events,
    pub(crate) token: Arc<T>,
}

/// User-side mirror of the kernel interest list, keyed by descriptor.
///
/// Only mutated after the matching `epoll_ctl` call has succeeded, so its
/// length is always the number of live kernel registrations.
pub(crate) struct Registry<T: ?Sized> {
    entries: HashMap<RawFd, Registration<T>>,
}

impl<T: ?Sized> Registry<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Records a new registration.
    ///
    /// An existing entry for `fd` means the descriptor was closed without a
    /// DEL (the kernel dropped it on its own) and the number was reused; the
    /// stale token is released in favour of the new one.
    pub(crate) fn insert(&mut self, fd: RawFd, events: Events, token: Arc<T>) {
        if self.entries.insert(fd, Registration { events, token }).is_some() {
            tracing::warn!(fd, "descriptor re-added without delete, replacing stale token");
        }
    }

    /// Replaces the mask and token of an existing entry.
    pub(crate) fn update(&mut self, fd: RawFd, events: Events, token: Arc<T>) {
        if let Some(entry) = self.entries.get_mut(&fd) {
            entry.events = events;
            entry.token = token;
        }
    }

    pub(crate) fn remove(&mut self, fd: RawFd) -> Option<Registration<T>> {
        self.entries.remove(&fd)
    }

    pub(crate) fn get(&self, fd: RawFd) -> Option<&Registration<T>> {
        self.entries.get(&fd)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
