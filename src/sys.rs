//! Thin wrappers over the epoll system calls.
//!
//! Every function returns `io::Result` built from `errno`; mapping to the
//! crate's `Error` happens in the handle, where the descriptors involved are
//! known.

use std::io;
use std::mem;
use std::os::unix::io::{FromRawFd, OwnedFd, RawFd};
use std::time::{Duration, Instant};

use libc::{
    EPOLL_CLOEXEC, F_GETFD, F_SETFD, FD_CLOEXEC, c_int, epoll_create, epoll_create1, epoll_ctl,
    epoll_event, epoll_wait, fcntl,
};

/// Size hint for `epoll_create`, ignored by kernels since 2.6.8 but must be positive.
const CREATE_SIZE_HINT: c_int = 1024;

/// Creates a new kernel readiness table.
///
/// Prefers the atomic `epoll_create1(EPOLL_CLOEXEC)`; kernels or sandboxes
/// without it get `epoll_create` followed by `fcntl(FD_CLOEXEC)`.
pub(crate) fn create(cloexec: bool) -> io::Result<OwnedFd> {
    let flags = if cloexec { EPOLL_CLOEXEC } else { 0 };
    let fd = unsafe { epoll_create1(flags) };

    if fd >= 0 {
        return Ok(unsafe { OwnedFd::from_raw_fd(fd) });
    }

    let err = io::Error::last_os_error();
    if !matches!(err.raw_os_error(), Some(libc::ENOSYS) | Some(libc::EINVAL)) {
        return Err(err);
    }

    tracing::debug!("epoll_create1 unavailable ({err}), falling back to epoll_create");

    let fd = unsafe { epoll_create(CREATE_SIZE_HINT) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    // Owned from here on so the descriptor is released if fcntl fails.
    let owned = unsafe { OwnedFd::from_raw_fd(fd) };
    if cloexec {
        set_cloexec(fd, true)?;
    }

    Ok(owned)
}

/// Issues one `epoll_ctl` call. `events` is ignored for `EPOLL_CTL_DEL`.
pub(crate) fn ctl(table: RawFd, op: c_int, target: RawFd, events: u32) -> io::Result<()> {
    let mut event = epoll_event {
        events,
        u64: target as u64,
    };

    let res = unsafe { epoll_ctl(table, op, target, &mut event) };
    if res < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Waits for events on `table`, filling `buffer` up to its capacity.
///
/// `EINTR` is retried with the timeout left until the original deadline, so
/// a signal never shortens or lengthens the caller's wait.
pub(crate) fn wait(
    table: RawFd,
    buffer: &mut Vec<epoll_event>,
    timeout: Option<Duration>,
) -> io::Result<()> {
    let deadline = timeout.map(|t| Instant::now().checked_add(t));
    buffer.clear();

    loop {
        let timeout_ms = match deadline {
            None => -1,
            Some(Some(deadline)) => to_millis(deadline.saturating_duration_since(Instant::now())),
            // The deadline does not fit in an Instant, wait as long as the kernel allows.
            Some(None) => c_int::MAX,
        };

        let res = unsafe {
            epoll_wait(
                table,
                buffer.as_mut_ptr(),
                buffer.capacity() as c_int,
                timeout_ms,
            )
        };

        if res >= 0 {
            unsafe { buffer.set_len(res as usize) };
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }

        tracing::trace!(table, "epoll_wait interrupted, retrying");
    }
}

pub(crate) fn is_cloexec(fd: RawFd) -> io::Result<bool> {
    let flags = unsafe { fcntl(fd, F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(flags & FD_CLOEXEC != 0)
}

pub(crate) fn set_cloexec(fd: RawFd, enabled: bool) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let flags = if enabled {
        flags | FD_CLOEXEC
    } else {
        flags & !FD_CLOEXEC
    };

    if unsafe { fcntl(fd, F_SETFD, flags) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Releases a descriptor, reporting the error `close(2)` returns.
///
/// The descriptor is gone whatever the outcome, so callers must not retry.
pub(crate) fn close(fd: RawFd) -> io::Result<()> {
    if unsafe { libc::close(fd) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Creates the nonblocking counter used to interrupt a blocked wait.
pub(crate) fn eventfd() -> io::Result<OwnedFd> {
    let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Makes `fd` readable by bumping its counter.
pub(crate) fn notify(fd: RawFd) -> io::Result<()> {
    let one: u64 = 1;

    loop {
        let res = unsafe { libc::write(fd, (&one as *const u64).cast(), mem::size_of::<u64>()) };
        if res >= 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.kind() {
            io::ErrorKind::Interrupted => continue,
            // Counter saturated, the descriptor is readable already.
            io::ErrorKind::WouldBlock => return Ok(()),
            _ => return Err(err),
        }
    }
}

/// Resets the counter of `fd` so it stops being readable.
pub(crate) fn drain(fd: RawFd) -> io::Result<()> {
    let mut counter: u64 = 0;

    loop {
        let res = unsafe {
            libc::read(fd, (&mut counter as *mut u64).cast(), mem::size_of::<u64>())
        };
        if res >= 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.kind() {
            io::ErrorKind::Interrupted => continue,
            io::ErrorKind::WouldBlock => return Ok(()),
            _ => return Err(err),
        }
    }
}

// Rounds up so a sub-millisecond timeout still sleeps instead of polling.
fn to_millis(timeout: Duration) -> c_int {
    let mut ms = timeout.as_millis();
    if timeout.subsec_nanos() % 1_000_000 != 0 {
        ms += 1;
    }

    ms.min(c_int::MAX as u128) as c_int
}
