//! Error taxonomy for the multiplexer.
//!
//! Caller mistakes (`InvalidArgument`, `ClosedHandle`, `AlreadyClosed`,
//! `InvalidState`) are detected before any system call is made. Everything
//! the kernel refuses surfaces as `SystemCall`, except construction-time
//! exhaustion and permission failures which get their own variants.

use std::io;
use std::os::unix::io::RawFd;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by [`Epoll`](crate::Epoll).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad verb, mask or argument arity.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The handle was used after `close`.
    #[error("closed epoll handle")]
    ClosedHandle,

    /// `close` was called on a handle that is already closed.
    #[error("epoll handle already closed")]
    AlreadyClosed,

    /// The handle is open but not in a state that allows the operation.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// An epoll system call failed for a reason other than interruption.
    #[error("{call} failed (table={table}{}): {source}", target_suffix(.target))]
    SystemCall {
        call: &'static str,
        table: RawFd,
        target: Option<RawFd>,
        #[source]
        source: io::Error,
    },

    /// The process or system ran out of descriptors or kernel memory.
    #[error("cannot create epoll table: {0}")]
    ResourceExhausted(#[source] io::Error),

    /// The kernel refused to create a table for this process.
    #[error("cannot create epoll table: {0}")]
    PermissionDenied(#[source] io::Error),
}

impl Error {
    /// Returns the OS error code carried by this error, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::SystemCall { source, .. }
            | Error::ResourceExhausted(source)
            | Error::PermissionDenied(source) => source.raw_os_error(),
            _ => None,
        }
    }

    pub(crate) fn create(source: io::Error) -> Self {
        match source.raw_os_error() {
            Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::ENOMEM) => {
                Error::ResourceExhausted(source)
            }
            Some(libc::EPERM) | Some(libc::EACCES) => Error::PermissionDenied(source),
            _ => Error::SystemCall {
                call: "create",
                table: -1,
                target: None,
                source,
            },
        }
    }
}

fn target_suffix(target: &Option<RawFd>) -> String {
    match target {
        Some(fd) => format!(", target={fd}"),
        None => String::new(),
    }
}
