use crate::events::Events;

use std::fmt;
use std::sync::Arc;

/// One readiness notification returned by a wait.
///
/// The token is the same `Arc` that was registered for the descriptor, so
/// the caller gets its resource back without a descriptor lookup.
pub struct Event<T: ?Sized> {
    token: Arc<T>,
    events: Events,
}

impl<T: ?Sized> Event<T> {
    pub(crate) fn new(token: Arc<T>, events: Events) -> Self {
        Self { token, events }
    }

    pub fn token(&self) -> &Arc<T> {
        &self.token
    }

    /// Conditions the kernel reported, including `ERROR` and `HANGUP`.
    pub fn events(&self) -> Events {
        self.events
    }

    pub fn into_token(self) -> Arc<T> {
        self.token
    }
}

impl<T: ?Sized> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            token: self.token.clone(),
            events: self.events,
        }
    }
}

impl<T: fmt::Debug + ?Sized> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("token", &self.token)
            .field("events", &self.events)
            .finish()
    }
}

/// Two events are equal when they carry the same token allocation and mask.
impl<T: ?Sized> PartialEq for Event<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.token, &other.token) && self.events == other.events
    }
}

impl<T: ?Sized> Eq for Event<T> {}
