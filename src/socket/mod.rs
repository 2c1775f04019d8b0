//! Blocking-API socket wrappers that can be handed to the dispatcher.
//!
//! These are thin, non-blocking-by-default wrappers over `std::net` (plus one
//! raw-`libc` constructor for a connect that should resolve asynchronously):
//! the dispatcher only needs a `Descriptor` and doesn't care how the caller
//! obtained it, but most callers will find these more convenient than hand
//! rolling the equivalent `libc` calls themselves.

mod addr;
pub mod tcp;

pub use tcp::{TcpListener, TcpStream};
