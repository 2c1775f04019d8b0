use std::os::unix::io::RawFd;

/// An opaque handle to an OS socket.
///
/// `Descriptor` wraps a raw file descriptor. The sentinel [`Descriptor::INVALID`]
/// (`-1`) marks "no socket" the same way the underlying `RawFd` would under POSIX.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Descriptor(pub RawFd);

impl Descriptor {
    pub const INVALID: Descriptor = Descriptor(-1);

    #[inline]
    pub fn is_valid(self) -> bool {
        self.0 != -1
    }

    #[inline]
    pub fn raw(self) -> RawFd {
        self.0
    }
}

impl From<RawFd> for Descriptor {
    #[inline]
    fn from(fd: RawFd) -> Descriptor {
        Descriptor(fd)
    }
}

impl From<Descriptor> for RawFd {
    #[inline]
    fn from(d: Descriptor) -> RawFd {
        d.0
    }
}

impl std::fmt::Display for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
