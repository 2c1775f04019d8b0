use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::{Error, Result};

/// Resolves `addr` to a single socket address, translating a resolution
/// failure into [`Error::Os`] rather than letting `io::Error` leak past the
/// crate boundary unwrapped.
pub fn resolve_one<A: ToSocketAddrs>(addr: A) -> Result<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(Error::Os)?
        .next()
        .ok_or(Error::InvalidArg)
}
