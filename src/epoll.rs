//! The multiplexer handle.
//!
//! An [`Epoll`] owns one kernel readiness table and a registry mirroring the
//! table's interest list. Registrations carry an `Arc<T>` token which is
//! handed back, untouched, in every [`Event`] the kernel reports for that
//! descriptor.
//!
//! # Example
//!
//! ```no_run
//! use epoll::{Epoll, Events};
//! use std::os::unix::net::UnixStream;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> epoll::Result<()> {
//! let (left, right) = UnixStream::pair().unwrap();
//! let left = Arc::new(left);
//!
//! let mut epoll = Epoll::new()?;
//! epoll.add(&left, Events::READABLE)?;
//!
//! for event in epoll.wait(Some(Duration::from_millis(100)))? {
//!     assert!(Arc::ptr_eq(event.token(), &left));
//! }
//! # drop(right);
//! # Ok(())
//! # }
//! ```

use crate::builder::EpollBuilder;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::events::{Events, Op};
use crate::registry::Registry;
use crate::sys;
use crate::wait::{WaitFuture, WaitWorker};

use std::fmt;
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, OwnedFd, RawFd};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use libc::epoll_event;

/// Handle over one kernel readiness table.
///
/// `T` is the token type: any resource exposing its descriptor through
/// [`AsRawFd`]. Mutating operations take `&mut self` and waits take `&self`,
/// so a wait can never observe a half-applied registration.
pub struct Epoll<T: ?Sized> {
    table: Option<OwnedFd>,
    registry: Registry<T>,
    max_events: usize,
    worker: OnceLock<WaitWorker>,
}

impl<T: ?Sized> Epoll<T> {
    /// Creates a multiplexer with the default configuration.
    ///
    /// The table is close-on-exec and waits report at most 256 events per call.
    ///
    /// # Errors
    /// `ResourceExhausted` when the descriptor or kernel memory limits are
    /// reached, `PermissionDenied` when the kernel refuses the table.
    pub fn new() -> Result<Self> {
        EpollBuilder::new().build()
    }

    /// Returns a builder to configure the multiplexer before creating it.
    pub fn builder() -> EpollBuilder {
        EpollBuilder::new()
    }

    pub(crate) fn from_parts(table: OwnedFd, max_events: usize) -> Self {
        tracing::debug!(table = table.as_raw_fd(), max_events, "epoll table created");

        Self {
            table: Some(table),
            registry: Registry::new(),
            max_events,
            worker: OnceLock::new(),
        }
    }

    /// Returns the descriptor of the kernel table.
    ///
    /// # Errors
    /// `ClosedHandle` once the multiplexer has been closed.
    pub fn fileno(&self) -> Result<RawFd> {
        self.table_fd().map(|fd| fd.as_raw_fd())
    }

    /// Number of descriptors currently registered.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.table.is_none()
    }

    /// Upper bound on the number of events a single wait returns.
    pub fn max_events(&self) -> usize {
        self.max_events
    }

    pub fn is_close_on_exec(&self) -> Result<bool> {
        let table = self.fileno()?;

        sys::is_cloexec(table).map_err(|source| Error::SystemCall {
            call: "fcntl",
            table,
            target: None,
            source,
        })
    }

    pub fn set_close_on_exec(&mut self, enabled: bool) -> Result<()> {
        let table = self.fileno()?;

        sys::set_cloexec(table, enabled).map_err(|source| Error::SystemCall {
            call: "fcntl",
            table,
            target: None,
            source,
        })
    }

    /// Releases the kernel table and every token kept alive by the registry.
    ///
    /// Never blocks. The descriptor is released exactly once: a second call
    /// leaves the OS alone and reports `AlreadyClosed`.
    pub fn close(&mut self) -> Result<()> {
        let table = self.table.take().ok_or(Error::AlreadyClosed)?;
        self.release(table);

        Ok(())
    }

    /// Blocks the calling thread until events are ready or `timeout` elapses.
    ///
    /// `None` waits indefinitely and `Some(Duration::ZERO)` polls. At most
    /// `min(len(), max_events())` events are returned in kernel order; any
    /// further ready descriptors are reported by the next call. An empty
    /// vector means the timeout elapsed.
    ///
    /// Signal interruptions are retried internally against the original
    /// deadline and never reported.
    ///
    /// # Errors
    /// `ClosedHandle` after close, `InvalidState` when nothing is registered,
    /// `SystemCall` when `epoll_wait` fails.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<Vec<Event<T>>> {
        let (table, capacity) = self.prepare_wait()?;

        let mut buffer = Vec::with_capacity(capacity);
        sys::wait(table.as_raw_fd(), &mut buffer, timeout)
            .map_err(|source| wait_error(table.as_raw_fd(), source))?;

        Ok(self.decode(&buffer))
    }

    /// Same as [`wait`](Self::wait), but only suspends the calling task.
    ///
    /// The `epoll_wait` call runs on a worker thread owned by this handle, so
    /// sibling tasks on the same executor keep running while the kernel
    /// blocks. The result is decoded once the task resumes.
    ///
    /// Dropping the future before it completes cancels the wait: the worker
    /// is woken, takes nothing from the table, and serves the next request.
    pub fn wait_async(&self, timeout: Option<Duration>) -> WaitFuture<'_, T> {
        WaitFuture::new(self, timeout)
    }

    pub(crate) fn table_fd(&self) -> Result<BorrowedFd<'_>> {
        self.table
            .as_ref()
            .map(|table| table.as_fd())
            .ok_or(Error::ClosedHandle)
    }

    /// Checks the wait preconditions and returns the table with the buffer size to use.
    pub(crate) fn prepare_wait(&self) -> Result<(BorrowedFd<'_>, usize)> {
        let table = self.table_fd()?;

        let registered = self.registry.len();
        if registered == 0 {
            return Err(Error::InvalidState("empty interest set"));
        }

        Ok((table, registered.min(self.max_events)))
    }

    pub(crate) fn worker(&self) -> Result<&WaitWorker> {
        if let Some(worker) = self.worker.get() {
            return Ok(worker);
        }

        let table = self.table_fd()?;
        let worker =
            WaitWorker::spawn(table).map_err(|source| wait_error(table.as_raw_fd(), source))?;

        Ok(self.worker.get_or_init(|| worker))
    }

    pub(crate) fn running_worker(&self) -> Option<&WaitWorker> {
        self.worker.get()
    }

    /// Turns raw kernel events into tokens, keeping kernel order.
    pub(crate) fn decode(&self, raw: &[epoll_event]) -> Vec<Event<T>> {
        let mut ready = Vec::with_capacity(raw.len());

        for event in raw {
            let fd = event.u64 as RawFd;
            let bits = event.events;

            match self.registry.get(fd) {
                Some(registration) => ready.push(Event::new(
                    Arc::clone(&registration.token),
                    Events::from_bits_retain(bits),
                )),
                None => tracing::trace!(fd, "skipping event for unregistered descriptor"),
            }
        }

        tracing::trace!(ready = ready.len(), "epoll wait returned");

        ready
    }

    fn release(&mut self, table: OwnedFd) {
        // Joins the worker, which closes its duplicate of the table.
        self.worker.take();
        self.registry.clear();

        let fd = table.into_raw_fd();
        match sys::close(fd) {
            Ok(()) => tracing::debug!(table = fd, "epoll table closed"),
            Err(err) => tracing::warn!(table = fd, "closing epoll table reported {err}"),
        }
    }
}

impl<T: AsRawFd + ?Sized> Epoll<T> {
    /// Adds, modifies or removes the registration of `source`.
    ///
    /// `events` is required for [`Op::Add`] and [`Op::Mod`] and must be a
    /// non-empty subset of [`Events::INTEREST`]; it must be `None` for
    /// [`Op::Del`]. The registry is only updated once the kernel accepted the
    /// change: ADD keeps `source` alive as the token, MOD replaces the mask
    /// and token, DEL drops the token.
    ///
    /// # Errors
    /// `ClosedHandle`, `InvalidArgument` for a bad mask or arity, and
    /// `SystemCall` (carrying both descriptors) when `epoll_ctl` fails, for
    /// example `EEXIST` on a duplicate ADD or `ENOENT` on an unknown MOD/DEL.
    pub fn ctl(&mut self, op: Op, source: &Arc<T>, events: Option<Events>) -> Result<()> {
        let table = self.fileno()?;

        let events = match (op, events) {
            (Op::Add | Op::Mod, Some(events)) if !events.is_valid_interest() => {
                return Err(Error::InvalidArgument("undefined events"));
            }
            (Op::Del, Some(_)) => return Err(Error::InvalidArgument("unexpected argument")),
            (Op::Add | Op::Mod, None) => return Err(Error::InvalidArgument("missing argument")),
            (_, events) => events.unwrap_or(Events::empty()),
        };

        let target = source.as_raw_fd();
        sys::ctl(table, op.raw(), target, events.bits()).map_err(|source| Error::SystemCall {
            call: "ctl",
            table,
            target: Some(target),
            source,
        })?;

        match op {
            Op::Add => self.registry.insert(target, events, Arc::clone(source)),
            Op::Mod => self.registry.update(target, events, Arc::clone(source)),
            Op::Del => {
                self.registry.remove(target);
            }
        }

        tracing::trace!(table, target, ?op, ?events, "interest updated");

        Ok(())
    }

    /// Registers `source` with `events`. Shorthand for `ctl(Op::Add, ..)`.
    pub fn add(&mut self, source: &Arc<T>, events: Events) -> Result<()> {
        self.ctl(Op::Add, source, Some(events))
    }

    /// Replaces the mask of `source`. Shorthand for `ctl(Op::Mod, ..)`.
    ///
    /// Also re-arms a registration disabled by [`Events::ONE_SHOT`].
    pub fn modify(&mut self, source: &Arc<T>, events: Events) -> Result<()> {
        self.ctl(Op::Mod, source, Some(events))
    }

    /// Removes `source`. Shorthand for `ctl(Op::Del, ..)`.
    pub fn delete(&mut self, source: &Arc<T>) -> Result<()> {
        self.ctl(Op::Del, source, None)
    }

    pub fn contains(&self, source: &T) -> bool {
        self.registry.get(source.as_raw_fd()).is_some()
    }

    /// Returns the mask `source` is registered with, if any.
    pub fn interest(&self, source: &T) -> Option<Events> {
        self.registry
            .get(source.as_raw_fd())
            .map(|registration| registration.events)
    }
}

impl<T: ?Sized> Drop for Epoll<T> {
    fn drop(&mut self) {
        if let Some(table) = self.table.take() {
            self.release(table);
        }
    }
}

impl<T: ?Sized> fmt::Display for Epoll<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "Epoll(fd {})", table.as_raw_fd()),
            None => f.write_str("Epoll(closed)"),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Epoll<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Epoll")
            .field("table", &self.table.as_ref().map(|table| table.as_raw_fd()))
            .field("registered", &self.registry.len())
            .field("max_events", &self.max_events)
            .finish()
    }
}

pub(crate) fn wait_error(table: RawFd, source: std::io::Error) -> Error {
    Error::SystemCall {
        call: "wait",
        table,
        target: None,
        source,
    }
}
