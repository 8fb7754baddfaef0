//! Readiness masks shared by the event loop and its sources.

/// Poll event mask (a thin view over `libc::POLL*` bits).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Readiness(pub libc::c_short);

impl Readiness {
    pub const NONE: Readiness = Readiness(0);
    pub const READABLE: Readiness = Readiness(libc::POLLIN);
    pub const WRITABLE: Readiness = Readiness(libc::POLLOUT);
    pub const HANGUP: Readiness = Readiness(libc::POLLHUP);
    pub const ERROR: Readiness = Readiness(libc::POLLERR);
    pub const INVALID: Readiness = Readiness(libc::POLLNVAL);

    /// Conditions the kernel reports whether or not they were requested.
    pub const ALWAYS: Readiness = Readiness(libc::POLLHUP | libc::POLLERR | libc::POLLNVAL);

    pub fn contains(self, other: Readiness) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Readiness) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_readable(self) -> bool {
        self.intersects(Self::READABLE)
    }

    /// Peer closed or the descriptor is in an error state.
    pub fn is_hangup(self) -> bool {
        self.intersects(Self::ALWAYS)
    }
}

impl std::ops::BitOr for Readiness {
    type Output = Readiness;

    fn bitor(self, rhs: Readiness) -> Readiness {
        Readiness(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for Readiness {
    type Output = Readiness;

    fn bitand(self, rhs: Readiness) -> Readiness {
        Readiness(self.0 & rhs.0)
    }
}
