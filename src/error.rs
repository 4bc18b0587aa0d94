//! Module implement the error type and convenience macro used across this crate.

use std::{fmt, result};

/// Error variants returned by this crate's indexes.
///
/// Variant names are chosen to match the call-site, not the underlying
/// cause, so that `err_at!` call sites read as a sentence.
#[derive(Debug)]
pub enum Error {
    /// allocation failed inside a growth path (tower extension, column
    /// extension, pot split); the index is left unchanged.
    OutOfMemory(String),
    /// insert of an already-visible element into a unique index.
    UniqueConstraintViolation(String),
    /// insert of an element-identical entry into a multi-valued index.
    DuplicateItem(String),
    /// remove or lookup of a key/element that isn't present.
    NotFound(String),
    /// operator-tree arity inconsistent with the index's declared arity.
    BadArity(String),
    /// operator-tree parameter inconsistent with the index kind.
    BadParameter(String),
    /// operator kind not implemented by this index kind.
    Unsupported(String),
    /// geo insert with a latitude/longitude outside its valid range.
    InvalidCoordinate(String),
    /// an internal invariant was violated; this is not recoverable.
    CorruptState(String),
    /// background thread (garbage collector) failed to join cleanly.
    ThreadFail(String),
    /// inter-thread channel send/recv failed.
    IPCFail(String),
    /// a numeric conversion between width/sign could not be performed.
    FailConvert(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::OutOfMemory(msg) => write!(f, "OutOfMemory: {}", msg),
            Error::UniqueConstraintViolation(msg) => {
                write!(f, "UniqueConstraintViolation: {}", msg)
            }
            Error::DuplicateItem(msg) => write!(f, "DuplicateItem: {}", msg),
            Error::NotFound(msg) => write!(f, "NotFound: {}", msg),
            Error::BadArity(msg) => write!(f, "BadArity: {}", msg),
            Error::BadParameter(msg) => write!(f, "BadParameter: {}", msg),
            Error::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            Error::InvalidCoordinate(msg) => write!(f, "InvalidCoordinate: {}", msg),
            Error::CorruptState(msg) => write!(f, "CorruptState: {}", msg),
            Error::ThreadFail(msg) => write!(f, "ThreadFail: {}", msg),
            Error::IPCFail(msg) => write!(f, "IPCFail: {}", msg),
            Error::FailConvert(msg) => write!(f, "FailConvert: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

/// Build an [Error] tagged with call-site file:line, either directly from
/// a `msg:` format string, or by wrapping the error arm of a `Result`.
///
/// ```ignore
/// err_at!(NotFound, msg: "key {:?}", key)
/// err_at!(IPCFail, rx.recv())?
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let msg = format!($($arg),+);
        Err($crate::Error::$v(format!("{}:{} {}", file!(), line!(), msg)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let msg = format!("{}:{} {}", file!(), line!(), err);
                Err($crate::Error::$v(msg))
            }
        }
    }};
}
