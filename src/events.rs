//! Interest and readiness masks, and the control verbs accepted by `ctl`.

use crate::error::Error;

use bitflags::bitflags;

bitflags! {
    /// Readiness conditions, with the same numeric values as the kernel's
    /// `EPOLL*` constants.
    ///
    /// Every flag can appear in a reported event. `ERROR` and `HANGUP` are
    /// always reported by the kernel and cannot be requested; the trigger
    /// modes `EDGE_TRIGGERED` and `ONE_SHOT` can only be requested.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Events: u32 {
        const READABLE = libc::EPOLLIN as u32;
        const PRIORITY = libc::EPOLLPRI as u32;
        const WRITABLE = libc::EPOLLOUT as u32;
        const ERROR = libc::EPOLLERR as u32;
        const HANGUP = libc::EPOLLHUP as u32;
        const PEER_CLOSED = libc::EPOLLRDHUP as u32;
        const ONE_SHOT = libc::EPOLLONESHOT as u32;
        const EDGE_TRIGGERED = libc::EPOLLET as u32;
    }
}

impl Events {
    /// The bits a registration may ask for.
    pub const INTEREST: Events = Events::READABLE
        .union(Events::PRIORITY)
        .union(Events::PEER_CLOSED)
        .union(Events::WRITABLE)
        .union(Events::EDGE_TRIGGERED)
        .union(Events::ONE_SHOT);

    /// Returns true when the mask is non-empty and made only of requestable bits.
    pub fn is_valid_interest(self) -> bool {
        !self.is_empty() && Events::INTEREST.contains(self)
    }

    pub fn is_readable(self) -> bool {
        self.contains(Events::READABLE)
    }

    pub fn is_writable(self) -> bool {
        self.contains(Events::WRITABLE)
    }

    pub fn is_error(self) -> bool {
        self.contains(Events::ERROR)
    }

    pub fn is_hangup(self) -> bool {
        self.contains(Events::HANGUP)
    }

    pub fn is_peer_closed(self) -> bool {
        self.contains(Events::PEER_CLOSED)
    }
}

/// Mutation applied to the interest set by `ctl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Register a new descriptor.
    Add,
    /// Change the mask of a registered descriptor.
    Mod,
    /// Remove a registered descriptor.
    Del,
}

impl Op {
    /// Kernel value of the verb (`EPOLL_CTL_*`).
    pub const fn raw(self) -> i32 {
        match self {
            Op::Add => libc::EPOLL_CTL_ADD,
            Op::Mod => libc::EPOLL_CTL_MOD,
            Op::Del => libc::EPOLL_CTL_DEL,
        }
    }
}

impl TryFrom<i32> for Op {
    type Error = Error;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            libc::EPOLL_CTL_ADD => Ok(Op::Add),
            libc::EPOLL_CTL_MOD => Ok(Op::Mod),
            libc::EPOLL_CTL_DEL => Ok(Op::Del),
            _ => Err(Error::InvalidArgument("unknown control operation")),
        }
    }
}

impl From<Op> for i32 {
    fn from(op: Op) -> Self {
        op.raw()
    }
}
