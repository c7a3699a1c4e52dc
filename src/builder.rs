//! Fluent builder for Epoll construction.
//!
//! Provides a builder pattern interface for creating and configuring
//! multiplexer instances.

use crate::epoll::Epoll;
use crate::error::{Error, Result};
use crate::sys;

/// Default cap on the events returned by a single wait.
pub const DEFAULT_MAX_EVENTS: usize = 256;

/// Builder for constructing [`Epoll`] instances with fluent API.
///
/// # Example
/// ```no_run
/// use epoll::EpollBuilder;
/// use std::fs::File;
///
/// let epoll = EpollBuilder::new()
///     .max_events(64)
///     .close_on_exec(false)
///     .build::<File>()
///     .unwrap();
///
/// assert_eq!(epoll.max_events(), 64);
/// ```
#[derive(Debug, Clone)]
pub struct EpollBuilder {
    max_events: usize,
    close_on_exec: bool,
}

impl Default for EpollBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EpollBuilder {
    /// Creates a builder with the defaults: 256 events per wait, close-on-exec.
    pub fn new() -> Self {
        Self {
            max_events: DEFAULT_MAX_EVENTS,
            close_on_exec: true,
        }
    }

    /// Caps the number of events a single wait can return.
    ///
    /// The wait buffer is sized to `min(registered, max_events)`, so a ready
    /// set larger than the cap is reported over several waits. Values below
    /// one are raised to one.
    pub fn max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events.clamp(1, i32::MAX as usize);
        self
    }

    /// Controls whether the table descriptor is closed across `exec`.
    pub fn close_on_exec(mut self, enabled: bool) -> Self {
        self.close_on_exec = enabled;
        self
    }

    /// Asks the kernel for a new readiness table and wraps it.
    ///
    /// # Errors
    /// `ResourceExhausted` (`EMFILE`, `ENFILE`, `ENOMEM`), `PermissionDenied`
    /// (`EPERM`, `EACCES`) or `SystemCall` for anything else.
    pub fn build<T: ?Sized>(self) -> Result<Epoll<T>> {
        let table = sys::create(self.close_on_exec).map_err(Error::create)?;

        Ok(Epoll::from_parts(table, self.max_events))
    }
}
