use std::io::{Read, Write};
use std::mem;
use std::net::{self, Shutdown, SocketAddr, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, RawFd};

use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::platform::syscall;

use super::addr::resolve_one;

/// A TCP listening socket, always created non-blocking so it can be driven by
/// the event dispatcher's ACCEPT path.
#[derive(Debug)]
pub struct TcpListener {
    inner: net::TcpListener,
}

impl TcpListener {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<TcpListener> {
        let inner = net::TcpListener::bind(addr).map_err(Error::Os)?;
        inner.set_nonblocking(true).map_err(Error::Os)?;
        Ok(TcpListener { inner })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr().map_err(Error::Os)
    }

    pub fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, addr) = self.inner.accept().map_err(Error::Os)?;
        stream.set_nonblocking(true).map_err(Error::Os)?;
        Ok((TcpStream { inner: stream }, addr))
    }

    pub fn take_error(&self) -> Result<Option<std::io::Error>> {
        self.inner.take_error().map_err(Error::Os)
    }

    pub fn descriptor(&self) -> Descriptor {
        Descriptor(self.inner.as_raw_fd())
    }
}

impl AsRawFd for TcpListener {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

impl FromRawFd for TcpListener {
    unsafe fn from_raw_fd(fd: RawFd) -> TcpListener {
        TcpListener { inner: net::TcpListener::from_raw_fd(fd) }
    }
}

impl IntoRawFd for TcpListener {
    fn into_raw_fd(self) -> RawFd {
        self.inner.into_raw_fd()
    }
}

/// A TCP connection, always non-blocking. [`TcpStream::connect`] performs a
/// blocking connect and is suitable when the caller doesn't need the
/// dispatcher's CONNECT/CONN_FAIL path; [`TcpStream::connect_nonblocking`]
/// starts the handshake and returns immediately with `connect_pending` set,
/// for registration with `EventMask::connect() | EventMask::conn_fail()`.
#[derive(Debug)]
pub struct TcpStream {
    inner: net::TcpStream,
}

impl TcpStream {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<TcpStream> {
        let inner = net::TcpStream::connect(addr).map_err(Error::Os)?;
        inner.set_nonblocking(true).map_err(Error::Os)?;
        Ok(TcpStream { inner })
    }

    /// Creates a non-blocking socket and issues `connect(2)`, returning
    /// before the handshake completes. The returned stream should be
    /// registered with `connect_pending: true` so the event thread's CONNECT
    /// probe (via `SO_ERROR`) resolves it on the first writability.
    pub fn connect_nonblocking<A: ToSocketAddrs>(addr: A) -> Result<TcpStream> {
        let addr = resolve_one(addr)?;
        let fam = match addr {
            SocketAddr::V4(_) => libc::AF_INET,
            SocketAddr::V6(_) => libc::AF_INET6,
        };

        let fd = syscall!(socket(fam, libc::SOCK_STREAM, 0)).map_err(Error::Os)?;
        let inner = unsafe { net::TcpStream::from_raw_fd(fd) };
        inner.set_nonblocking(true).map_err(Error::Os)?;

        let (sockaddr, len) = sockaddr_from(&addr);
        let res = unsafe { libc::connect(fd, &sockaddr as *const _ as *const libc::sockaddr, len) };
        if res == -1 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EINPROGRESS) {
                return Err(Error::Os(err));
            }
        }

        Ok(TcpStream { inner })
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.inner.peer_addr().map_err(Error::Os)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr().map_err(Error::Os)
    }

    pub fn shutdown(&self, how: Shutdown) -> Result<()> {
        self.inner.shutdown(how).map_err(Error::Os)
    }

    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.inner.set_nodelay(nodelay).map_err(Error::Os)
    }

    pub fn nodelay(&self) -> Result<bool> {
        self.inner.nodelay().map_err(Error::Os)
    }

    pub fn take_error(&self) -> Result<Option<std::io::Error>> {
        self.inner.take_error().map_err(Error::Os)
    }

    pub fn peek(&self, buf: &mut [u8]) -> Result<usize> {
        self.inner.peek(buf).map_err(Error::Os)
    }

    pub fn descriptor(&self) -> Descriptor {
        Descriptor(self.inner.as_raw_fd())
    }
}

impl Read for TcpStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for TcpStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl AsRawFd for TcpStream {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

impl FromRawFd for TcpStream {
    unsafe fn from_raw_fd(fd: RawFd) -> TcpStream {
        TcpStream { inner: net::TcpStream::from_raw_fd(fd) }
    }
}

impl IntoRawFd for TcpStream {
    fn into_raw_fd(self) -> RawFd {
        self.inner.into_raw_fd()
    }
}

fn sockaddr_from(addr: &SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let len = match addr {
        SocketAddr::V4(v4) => unsafe {
            let raw: *mut libc::sockaddr_in = &mut storage as *mut _ as *mut _;
            std::ptr::write(
                raw,
                libc::sockaddr_in {
                    sin_family: libc::AF_INET as libc::sa_family_t,
                    sin_port: v4.port().to_be(),
                    sin_addr: libc::in_addr { s_addr: u32::from_ne_bytes(v4.ip().octets()) },
                    sin_zero: [0; 8],
                },
            );
            mem::size_of::<libc::sockaddr_in>()
        },
        SocketAddr::V6(v6) => unsafe {
            let raw: *mut libc::sockaddr_in6 = &mut storage as *mut _ as *mut _;
            std::ptr::write(
                raw,
                libc::sockaddr_in6 {
                    sin6_family: libc::AF_INET6 as libc::sa_family_t,
                    sin6_port: v6.port().to_be(),
                    sin6_flowinfo: v6.flowinfo(),
                    sin6_addr: libc::in6_addr { s6_addr: v6.ip().octets() },
                    sin6_scope_id: v6.scope_id(),
                },
            );
            mem::size_of::<libc::sockaddr_in6>()
        },
    };
    (storage, len as libc::socklen_t)
}
