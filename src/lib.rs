//! A cross-platform Berkeley-sockets abstraction with an asynchronous
//! event-notification dispatcher.
//!
//! A caller registers a [`Descriptor`] together with an [`EventMask`] and a
//! callback; the library polls readiness across all registered sockets on a
//! dedicated event thread and invokes the callback once per event, in-thread,
//! with strict per-socket non-reentrancy. Registration-table mutations
//! (`register`/`modify`/`unregister`) never block on the poll syscall: they
//! enqueue a deferred operation that a second, dedicated sync thread applies
//! between poll iterations.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//!
//! use bal::{Descriptor, Event, EventMask, SocketHints};
//! use bal::socket::TcpListener;
//!
//! bal::init().unwrap();
//!
//! let listener = TcpListener::bind("127.0.0.1:0").unwrap();
//! let descriptor = listener.descriptor();
//! let done = Arc::new(AtomicBool::new(false));
//!
//! let done2 = done.clone();
//! bal::register(
//!     descriptor,
//!     EventMask::accept(),
//!     Arc::new(move |_d, event, _ctx| {
//!         if let Event::Accept = event {
//!             if let Ok((_stream, _addr)) = listener.accept() {
//!                 done2.store(true, Ordering::SeqCst);
//!             }
//!         }
//!     }),
//!     Box::new(()),
//!     SocketHints { listening: true, connect_pending: false },
//! )
//! .unwrap();
//!
//! // ... drive the listener from another thread, then:
//! bal::unregister(descriptor).unwrap();
//! bal::cleanup().unwrap();
//! ```

pub mod config;
pub mod context;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod event;
mod list;
pub mod platform;
pub mod registration;
pub mod socket;

pub use config::Config;
pub use context::{cleanup, init, modify, register, unregister, Context};
pub use descriptor::Descriptor;
pub use error::{Error, Result};
pub use event::{Event, EventMask};
pub use registration::{Callback, SocketHints};
