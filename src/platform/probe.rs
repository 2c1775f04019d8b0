use std::io;
use std::mem;
use std::os::unix::io::RawFd;

use super::syscall;

/// Peeks one byte without consuming it. `Ok(true)` means the peer has
/// performed an orderly shutdown (the socket is readable but empty — a
/// half-closed TCP connection); `Ok(false)` means there is at least one byte
/// of real data waiting.
pub fn peek_is_eof(fd: RawFd) -> io::Result<bool> {
    let mut byte: u8 = 0;
    let n = syscall!(recv(
        fd,
        &mut byte as *mut u8 as *mut libc::c_void,
        1,
        libc::MSG_PEEK,
    ))?;
    Ok(n == 0)
}

/// Reads `SO_ERROR` via `getsockopt`, clearing it as a side effect (standard
/// POSIX semantics) — the value a pending-connect or asynchronous-error probe
/// needs. `0` means no pending error.
pub fn socket_error(fd: RawFd) -> io::Result<i32> {
    let mut err: libc::c_int = 0;
    let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;

    syscall!(getsockopt(
        fd,
        libc::SOL_SOCKET,
        libc::SO_ERROR,
        &mut err as *mut libc::c_int as *mut libc::c_void,
        &mut len,
    ))?;

    Ok(err)
}
