//! Readiness multiplexing over Linux `epoll`.
//!
//! This crate wraps one kernel readiness table per [`Epoll`] handle and keeps
//! a typed mirror of its interest list, so the tokens handed to the kernel
//! are always alive when the kernel reports them back.
//!
//! # Architecture
//!
//! - **Epoll**: owns the table descriptor, the registry and the wait worker
//! - **Registry**: descriptor → (mask, `Arc` token), updated only after the
//!   kernel accepted a change
//! - **Events / Op**: interest and readiness masks, control verbs
//! - **Event**: one `(token, mask)` pair produced by a wait
//! - **WaitFuture**: async wait that moves the blocking syscall to a worker
//!   thread and resumes the calling task when it returns
//! - **EpollBuilder**: fluent configuration (buffer cap, close-on-exec)
//!
//! Only Linux (and Android) provide epoll.

mod builder;
mod epoll;
mod error;
mod event;
mod events;
mod registry;
mod sys;
mod wait;

pub use builder::{DEFAULT_MAX_EVENTS, EpollBuilder};
pub use epoll::Epoll;
pub use error::{Error, Result};
pub use event::Event;
pub use events::{Events, Op};
pub use wait::WaitFuture;
