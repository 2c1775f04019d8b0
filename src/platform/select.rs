use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

use super::syscall;

/// A `fd_set` for use with [`select`].
///
/// Thin safe wrapper over `libc::fd_set`: owns the raw OS type, exposes a
/// minimal safe surface, nothing fancier.
#[derive(Copy, Clone)]
pub struct FdSet(libc::fd_set);

impl FdSet {
    #[inline]
    pub fn empty() -> FdSet {
        let mut set = unsafe { mem::zeroed::<libc::fd_set>() };
        unsafe { libc::FD_ZERO(&mut set) };
        FdSet(set)
    }

    #[inline]
    pub fn insert(&mut self, fd: RawFd) {
        unsafe { libc::FD_SET(fd, &mut self.0) };
    }

    #[inline]
    pub fn contains(&self, fd: RawFd) -> bool {
        unsafe { libc::FD_ISSET(fd, &self.0) }
    }

    #[inline]
    pub fn clear(&mut self) {
        unsafe { libc::FD_ZERO(&mut self.0) };
    }

    #[inline]
    fn as_mut_ptr(&mut self) -> *mut libc::fd_set {
        &mut self.0
    }
}

impl Default for FdSet {
    fn default() -> FdSet {
        FdSet::empty()
    }
}

/// The readiness-poll syscall the event thread drives: `select(2)` over three
/// descriptor sets with a bounded timeout.
///
/// `max_fd` is the largest descriptor present in any of the three sets, or
/// `-1` if all are empty (matching [`crate::registration::RegistrationTable::snapshot`]'s
/// return value). `EINTR` is retried transparently against a wall-clock
/// deadline computed from `timeout`, so a caller never observes it; any other
/// failure is returned as-is. Returns the number of ready descriptors across
/// all three sets.
pub fn select(
    read: &mut FdSet,
    write: &mut FdSet,
    err: &mut FdSet,
    max_fd: RawFd,
    timeout: Duration,
) -> io::Result<i32> {
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut tv = libc::timeval {
            tv_sec: remaining.as_secs() as libc::time_t,
            tv_usec: remaining.subsec_micros() as libc::suseconds_t,
        };

        let nfds = max_fd + 1;
        match syscall!(select(
            nfds,
            read.as_mut_ptr(),
            write.as_mut_ptr(),
            err.as_mut_ptr(),
            &mut tv,
        )) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                if Instant::now() >= deadline {
                    return Ok(0);
                }
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn empty_sets_time_out_without_error() {
        let mut read = FdSet::empty();
        let mut write = FdSet::empty();
        let mut err = FdSet::empty();

        let n = select(&mut read, &mut write, &mut err, -1, Duration::from_millis(20)).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn detects_a_readable_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let fd = listener.as_raw_fd();

        let connector = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();

        let mut read = FdSet::empty();
        read.insert(fd);
        let mut write = FdSet::empty();
        let mut err = FdSet::empty();

        let n = select(&mut read, &mut write, &mut err, fd, Duration::from_secs(2)).unwrap();
        assert_eq!(n, 1);
        assert!(read.contains(fd));
        drop(connector);
    }

    #[test]
    fn fdset_insert_and_contains_roundtrip() {
        let mut set = FdSet::empty();
        assert!(!set.contains(3));
        set.insert(3);
        assert!(set.contains(3));
        set.clear();
        assert!(!set.contains(3));
    }
}
