//! Asynchronous wait support.
//!
//! `epoll_wait` cannot be made to yield, so the async path moves it off the
//! calling task. Each handle lazily starts one worker thread that owns a
//! duplicate of the table descriptor (sharing the same kernel table) and
//! serves wait requests sent over a channel. The task that issued a request
//! is suspended on a oneshot receiver and woken by the worker when the
//! syscall returns; decoding against the registry happens back on the task.
//!
//! The worker never blocks on the table itself. It blocks on a private
//! epoll instance watching the table and an `eventfd`, and only drains the
//! table once the request is still wanted. Dropping a pending future or the
//! worker raises the `eventfd`, so an abandoned wait never consumes events
//! and never outlives the handle.

use crate::epoll::{Epoll, wait_error};
use crate::error::Result;
use crate::event::Event;
use crate::events::{Events, Op};
use crate::sys;

use futures::FutureExt;
use futures::channel::oneshot;
use libc::epoll_event;
use std::future::Future;
use std::io;
use std::os::unix::io::{AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Reply = io::Result<Vec<epoll_event>>;

struct Request {
    capacity: usize,
    timeout: Option<Duration>,
    reply: oneshot::Sender<Reply>,
}

/// Wakes the worker out of its blocking wait.
struct Interrupt {
    event: OwnedFd,
    shutdown: AtomicBool,
}

impl Interrupt {
    fn raise(&self) {
        if let Err(err) = sys::notify(self.event.as_raw_fd()) {
            tracing::warn!(eventfd = self.event.as_raw_fd(), "cannot interrupt wait worker: {err}");
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Handle to the blocking worker of one multiplexer.
///
/// Dropping it stops the worker and joins the thread, so every descriptor
/// the worker holds is closed once the drop returns.
pub(crate) struct WaitWorker {
    transmitter: Option<Sender<Request>>,
    interrupt: Arc<Interrupt>,
    thread: Option<JoinHandle<()>>,
}

impl WaitWorker {
    pub(crate) fn spawn(table: BorrowedFd<'_>) -> io::Result<Self> {
        let interrupt = Arc::new(Interrupt {
            event: sys::eventfd()?,
            shutdown: AtomicBool::new(false),
        });

        let blocking = Blocking {
            table: table.try_clone_to_owned()?,
            watch: sys::create(true)?,
            interrupt: Arc::clone(&interrupt),
        };
        blocking.observe(blocking.table.as_raw_fd())?;
        blocking.observe(interrupt.event.as_raw_fd())?;

        let (transmitter, receiver) = mpsc::channel::<Request>();

        let thread = thread::Builder::new()
            .name("epoll-wait".to_string())
            .spawn(move || blocking.run(receiver))?;

        Ok(Self {
            transmitter: Some(transmitter),
            interrupt,
            thread: Some(thread),
        })
    }

    fn submit(
        &self,
        capacity: usize,
        timeout: Option<Duration>,
    ) -> Option<oneshot::Receiver<Reply>> {
        let (reply, receiver) = oneshot::channel();

        self.transmitter
            .as_ref()?
            .send(Request {
                capacity,
                timeout,
                reply,
            })
            .ok()?;

        Some(receiver)
    }

    /// Makes the worker re-check whether its current request is still wanted.
    pub(crate) fn interrupt(&self) {
        self.interrupt.raise();
    }
}

impl Drop for WaitWorker {
    fn drop(&mut self) {
        self.interrupt.shutdown.store(true, Ordering::Release);
        self.transmitter.take();
        self.interrupt.raise();

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("epoll wait worker panicked");
            }
        }
    }
}

/// State owned by the worker thread.
struct Blocking {
    table: OwnedFd,
    watch: OwnedFd,
    interrupt: Arc<Interrupt>,
}

impl Blocking {
    fn observe(&self, fd: RawFd) -> io::Result<()> {
        sys::ctl(
            self.watch.as_raw_fd(),
            Op::Add.raw(),
            fd,
            Events::READABLE.bits(),
        )
    }

    fn run(self, requests: Receiver<Request>) {
        for request in requests {
            if self.interrupt.is_shutdown() {
                break;
            }

            // The future was dropped before its turn came.
            if request.reply.is_canceled() {
                continue;
            }

            let result = match self.serve(&request) {
                Ok(Some(events)) => Ok(events),
                Ok(None) => {
                    tracing::trace!(table = self.table.as_raw_fd(), "pending wait canceled");
                    continue;
                }
                Err(err) => Err(err),
            };

            if let Err(unclaimed) = request.reply.send(result) {
                let dropped = unclaimed.map(|events| events.len()).unwrap_or(0);
                tracing::debug!(dropped, "wait future dropped while its reply was in flight");
            }
        }

        tracing::trace!(table = self.table.as_raw_fd(), "epoll wait worker exiting");
    }

    /// Blocks until the table has events, the timeout elapses, or the request
    /// is abandoned. `None` means abandoned; nothing was taken from the table.
    fn serve(&self, request: &Request) -> io::Result<Option<Vec<epoll_event>>> {
        let deadline = request.timeout.map(|timeout| Instant::now().checked_add(timeout));
        let wakeup = self.interrupt.event.as_raw_fd();
        let mut signals = Vec::with_capacity(2);

        loop {
            if self.interrupt.is_shutdown() {
                return Ok(None);
            }

            let remaining = deadline.map(|deadline| match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => Duration::MAX,
            });

            sys::wait(self.watch.as_raw_fd(), &mut signals, remaining)?;
            if signals.is_empty() {
                return Ok(Some(Vec::new()));
            }

            let mut table_ready = false;
            for signal in &signals {
                let key = signal.u64;
                if key == wakeup as u64 {
                    sys::drain(wakeup)?;
                } else {
                    table_ready = true;
                }
            }

            if self.interrupt.is_shutdown() || request.reply.is_canceled() {
                return Ok(None);
            }

            if table_ready {
                let mut buffer = Vec::with_capacity(request.capacity);
                sys::wait(self.table.as_raw_fd(), &mut buffer, Some(Duration::ZERO))?;

                if !buffer.is_empty() {
                    return Ok(Some(buffer));
                }
            }

            if remaining == Some(Duration::ZERO) {
                return Ok(Some(Vec::new()));
            }
        }
    }
}

/// Future returned by [`Epoll::wait_async`].
///
/// Resolves to the same result as [`Epoll::wait`]. Preconditions are checked
/// on the first poll, before anything is handed to the worker.
#[must_use = "futures do nothing unless polled"]
pub struct WaitFuture<'a, T: ?Sized> {
    epoll: &'a Epoll<T>,
    timeout: Option<Duration>,
    table: RawFd,
    pending: Option<oneshot::Receiver<Reply>>,
    completed: bool,
}

impl<'a, T: ?Sized> WaitFuture<'a, T> {
    pub(crate) fn new(epoll: &'a Epoll<T>, timeout: Option<Duration>) -> Self {
        Self {
            epoll,
            timeout,
            table: -1,
            pending: None,
            completed: false,
        }
    }

    fn submit(&mut self) -> Result<oneshot::Receiver<Reply>> {
        let epoll = self.epoll;
        let (table, capacity) = epoll.prepare_wait()?;
        self.table = table.as_raw_fd();

        epoll
            .worker()?
            .submit(capacity, self.timeout)
            .ok_or_else(|| wait_error(self.table, worker_gone()))
    }
}

impl<T: ?Sized> Future for WaitFuture<'_, T> {
    type Output = Result<Vec<Event<T>>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.as_mut().get_mut();
        assert!(!this.completed, "WaitFuture polled after completion");

        let mut receiver = match this.pending.take() {
            Some(receiver) => receiver,
            None => match this.submit() {
                Ok(receiver) => receiver,
                Err(err) => {
                    this.completed = true;
                    return Poll::Ready(Err(err));
                }
            },
        };

        let reply = match receiver.poll_unpin(cx) {
            Poll::Pending => {
                this.pending = Some(receiver);
                return Poll::Pending;
            }
            Poll::Ready(reply) => reply,
        };

        this.completed = true;

        let result = match reply {
            Ok(Ok(raw)) => Ok(this.epoll.decode(&raw)),
            Ok(Err(source)) => Err(wait_error(this.table, source)),
            Err(oneshot::Canceled) => Err(wait_error(this.table, worker_gone())),
        };

        Poll::Ready(result)
    }
}

impl<T: ?Sized> Drop for WaitFuture<'_, T> {
    fn drop(&mut self) {
        // Release the receiver first so the worker sees the request as canceled.
        if self.pending.take().is_some() {
            tracing::trace!(table = self.table, "wait future dropped while the worker is waiting");

            if let Some(worker) = self.epoll.running_worker() {
                worker.interrupt();
            }
        }
    }
}

fn worker_gone() -> io::Error {
    io::Error::other("epoll wait worker stopped")
}
