use std::{fmt, ops};

const READ: u32 = 0b0000_0001;
const WRITE: u32 = 0b0000_0010;
const CONNECT: u32 = 0b0000_0100;
const ACCEPT: u32 = 0b0000_1000;
const CLOSE: u32 = 0b0001_0000;
const CONN_FAIL: u32 = 0b0010_0000;
const ERROR: u32 = 0b0100_0000;
const INVALID: u32 = 0b1000_0000;

/// A bitmask of event kinds a registration is interested in.
///
/// A newtype over a `u32`: const bit values, `is_*` predicates, and the
/// usual bitwise operator impls.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EventMask(u32);

impl EventMask {
    #[inline]
    pub fn empty() -> EventMask {
        EventMask(0)
    }

    #[inline]
    pub fn read() -> EventMask {
        EventMask(READ)
    }

    #[inline]
    pub fn write() -> EventMask {
        EventMask(WRITE)
    }

    #[inline]
    pub fn connect() -> EventMask {
        EventMask(CONNECT)
    }

    #[inline]
    pub fn accept() -> EventMask {
        EventMask(ACCEPT)
    }

    #[inline]
    pub fn close() -> EventMask {
        EventMask(CLOSE)
    }

    #[inline]
    pub fn conn_fail() -> EventMask {
        EventMask(CONN_FAIL)
    }

    #[inline]
    pub fn error() -> EventMask {
        EventMask(ERROR)
    }

    #[inline]
    pub fn invalid() -> EventMask {
        EventMask(INVALID)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn contains(self, other: EventMask) -> bool {
        (self.0 & other.0) == other.0 && other.0 != 0
    }

    #[inline]
    pub fn is_readable(self) -> bool {
        self.contains(EventMask::read())
    }

    #[inline]
    pub fn is_writable(self) -> bool {
        self.contains(EventMask::write())
    }

    #[inline]
    pub fn is_connect(self) -> bool {
        self.contains(EventMask::connect())
    }

    #[inline]
    pub fn is_accept(self) -> bool {
        self.contains(EventMask::accept())
    }

    #[inline]
    pub fn is_close(self) -> bool {
        self.contains(EventMask::close())
    }

    #[inline]
    pub fn is_conn_fail(self) -> bool {
        self.contains(EventMask::conn_fail())
    }

    #[inline]
    pub fn is_error(self) -> bool {
        self.contains(EventMask::error())
    }

    #[inline]
    pub fn is_invalid(self) -> bool {
        self.contains(EventMask::invalid())
    }

    /// True if the mask implies interest in `select`'s read-fd-set (READ,
    /// ACCEPT, CLOSE all surface through readability).
    #[inline]
    pub fn wants_read_set(self) -> bool {
        self.contains(EventMask::read())
            || self.contains(EventMask::accept())
            || self.contains(EventMask::close())
    }

    /// True if the mask implies interest in `select`'s write-fd-set (WRITE and
    /// a pending CONNECT both surface through writability).
    #[inline]
    pub fn wants_write_set(self) -> bool {
        self.contains(EventMask::write()) || self.contains(EventMask::connect())
    }

    /// True if the mask implies interest in `select`'s error-fd-set.
    #[inline]
    pub fn wants_err_set(self) -> bool {
        self.contains(EventMask::error()) || self.contains(EventMask::conn_fail())
    }

    /// The set of bits this library recognizes; used to reject unknown bits at
    /// `register`/`modify` time.
    #[inline]
    pub fn all_known() -> EventMask {
        EventMask(READ | WRITE | CONNECT | ACCEPT | CLOSE | CONN_FAIL | ERROR | INVALID)
    }

    #[inline]
    pub fn has_unknown_bits(self) -> bool {
        (self.0 & !EventMask::all_known().0) != 0
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl ops::BitOr for EventMask {
    type Output = EventMask;

    #[inline]
    fn bitor(self, other: EventMask) -> EventMask {
        EventMask(self.0 | other.0)
    }
}

impl ops::BitOrAssign for EventMask {
    #[inline]
    fn bitor_assign(&mut self, other: EventMask) {
        self.0 |= other.0;
    }
}

impl ops::BitAnd for EventMask {
    type Output = EventMask;

    #[inline]
    fn bitand(self, other: EventMask) -> EventMask {
        EventMask(self.0 & other.0)
    }
}

impl ops::Sub for EventMask {
    type Output = EventMask;

    #[inline]
    fn sub(self, other: EventMask) -> EventMask {
        EventMask(self.0 & !other.0)
    }
}

impl ops::Not for EventMask {
    type Output = EventMask;

    #[inline]
    fn not(self) -> EventMask {
        EventMask(!self.0)
    }
}

impl From<u32> for EventMask {
    fn from(bits: u32) -> EventMask {
        EventMask(bits)
    }
}

impl fmt::Debug for EventMask {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        let flags = [
            (EventMask::read(), "Read"),
            (EventMask::write(), "Write"),
            (EventMask::connect(), "Connect"),
            (EventMask::accept(), "Accept"),
            (EventMask::close(), "Close"),
            (EventMask::conn_fail(), "ConnFail"),
            (EventMask::error(), "Error"),
            (EventMask::invalid(), "Invalid"),
        ];

        for &(flag, msg) in &flags {
            if self.contains(flag) {
                if wrote {
                    write!(fmt, " | ")?;
                }
                write!(fmt, "{}", msg)?;
                wrote = true;
            }
        }

        if !wrote {
            write!(fmt, "(empty)")?;
        }

        Ok(())
    }
}

/// A single event delivery. Exactly one of these is passed per callback
/// invocation — never a combined mask.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Read,
    Write,
    Connect,
    Accept,
    Close,
    /// A pending connect failed; carries the raw `SO_ERROR` value.
    ConnFail(i32),
    /// An asynchronous socket error; carries the raw `SO_ERROR` value.
    Error(i32),
    Invalid,
    /// Synthetic, out-of-band delivery: the sync thread has applied this
    /// descriptor's `unregister` and it is no longer live. Not part of
    /// `EventMask` — it is never requested, only ever delivered once as
    /// teardown acknowledgement when the interest mask held no terminal event.
    Removed,
}

impl Event {
    /// The `EventMask` bit this delivery corresponds to, if any (`Removed`
    /// has none — it's synthetic).
    pub fn mask_bit(self) -> Option<EventMask> {
        match self {
            Event::Read => Some(EventMask::read()),
            Event::Write => Some(EventMask::write()),
            Event::Connect => Some(EventMask::connect()),
            Event::Accept => Some(EventMask::accept()),
            Event::Close => Some(EventMask::close()),
            Event::ConnFail(_) => Some(EventMask::conn_fail()),
            Event::Error(_) => Some(EventMask::error()),
            Event::Invalid => Some(EventMask::invalid()),
            Event::Removed => None,
        }
    }

    /// True for the two events that conclude a descriptor's lifecycle without
    /// a separate synthetic `Removed` delivery.
    pub fn is_terminal(self) -> bool {
        matches!(self, Event::Close | Event::Invalid)
    }
}
