use std::cell::RefCell;
use std::fmt;

/// The library's error taxonomy.
///
/// Everything that isn't a passthrough OS error is one of the named library
/// variants below; [`Error::Os`] carries a raw OS error so callers can still
/// distinguish a library-level failure from an underlying `errno` value
/// without a bit-packing convention.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("a required pointer argument was null")]
    NullPtr,
    #[error("a string argument was null or empty")]
    BadString,
    #[error("the socket argument was invalid")]
    BadSocket,
    #[error("the supplied buffer length was invalid")]
    BadBufLen,
    #[error("one or more arguments were invalid")]
    InvalidArg,
    #[error("the library has not been initialized")]
    NotInit,
    #[error("the library is already initialized")]
    DupeInit,
    #[error("asynchronous I/O has not been initialized")]
    AsNotInit,
    #[error("asynchronous I/O is already initialized")]
    AsDupeInit,
    #[error("the socket is not registered for asynchronous I/O events")]
    AsNoSocket,
    #[error("the event mask was invalid")]
    BadEvtMask,
    #[error("an internal error occurred: {0}")]
    Internal(String),
    #[error("the requested feature is disabled or unavailable")]
    Unavail,
    #[error("OS error: {0}")]
    Os(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// An [`Error`] paired with the function/file/line of the call that recorded it.
#[derive(Debug)]
pub struct ErrorContext {
    pub error_string: String,
    pub function: &'static str,
    pub file: &'static str,
    pub line: u32,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (in {} at {}:{})",
            self.error_string, self.function, self.file, self.line
        )
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<ErrorContext>> = RefCell::new(None);
}

/// Records `err` as the calling thread's last error. Called at every fallible
/// public entry point's error return site via [`set_last_error`].
#[doc(hidden)]
pub fn __set_last_error(err: &Error, function: &'static str, file: &'static str, line: u32) {
    LAST_ERROR.with(|cell| {
        *cell.borrow_mut() = Some(ErrorContext {
            error_string: err.to_string(),
            function,
            file,
            line,
        });
    });
}

/// Records the thread-local last error, tagging it with the call site.
///
/// Use at every public fallible entry point's error path, e.g.
/// `return Err(set_last_error(Error::BadSocket));`.
#[macro_export]
macro_rules! set_last_error {
    ($err:expr) => {{
        let err = $err;
        $crate::error::__set_last_error(&err, function_name!(), file!(), line!());
        err
    }};
}

/// Expands to the enclosing function's name, approximating `__func__`.
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        &name[..name.len() - 3]
    }};
}

/// Returns the short description of the calling thread's last recorded error.
pub fn get_last_error() -> Option<String> {
    LAST_ERROR.with(|cell| cell.borrow().as_ref().map(|ctx| ctx.error_string.clone()))
}

/// Returns the extended description (short description plus call site) of the
/// calling thread's last recorded error.
pub fn get_last_error_ext() -> Option<String> {
    LAST_ERROR.with(|cell| cell.borrow().as_ref().map(|ctx| ctx.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_short_and_extended_descriptions() {
        let errs: Vec<Error> = vec![
            Error::NullPtr,
            Error::BadString,
            Error::BadSocket,
            Error::BadBufLen,
            Error::InvalidArg,
            Error::NotInit,
            Error::DupeInit,
            Error::AsNotInit,
            Error::AsDupeInit,
            Error::AsNoSocket,
            Error::BadEvtMask,
            Error::Internal("test".into()),
            Error::Unavail,
        ];

        for err in errs {
            let _ = set_last_error!(err);
            let short = get_last_error().expect("short description");
            assert!(!short.is_empty());
            let ext = get_last_error_ext().expect("extended description");
            assert!(!ext.is_empty());
            assert!(ext.contains(&short));
        }
    }

    #[test]
    fn os_error_round_trips() {
        let os_err = std::io::Error::from_raw_os_error(libc::EINTR);
        let _ = set_last_error!(Error::Os(os_err));
        let short = get_last_error().expect("short description");
        assert!(!short.is_empty());
    }
}
