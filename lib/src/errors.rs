use std::result::Result as StdResult;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KmhError {
    #[error("unable to allocate storage for {requested} elements")]
    Allocation { requested: usize },
    #[error("invalid sketch parameters: {0}")]
    InvalidParams(String),
    #[error("sketches are incompatible: {param} is {left} on one side and {right} on the other")]
    Incompatible {
        param: &'static str,
        left: String,
        right: String,
    },
    #[error("serialized sketch is truncated: needed {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },
    #[error("serialized sketch is corrupt: {0}")]
    Corrupt(String),
    #[error("{function} requires exactly {expected} argument(s), got {actual}")]
    Arity {
        function: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("failed to load/read/write file: {0:?}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0:?}")]
    Json(#[from] serde_json::Error),
    #[error("kminhash error: {0}")]
    Message(String),
}

impl KmhError {
    /// True for the errors the host layer reports as "no result" instead of
    /// raising: bad bytes and incompatible parameters.
    pub fn is_no_result(&self) -> bool {
        matches!(
            self,
            KmhError::Incompatible { .. } | KmhError::Truncated { .. } | KmhError::Corrupt(_)
        )
    }
}

pub type KmhResult<T> = StdResult<T, KmhError>;

#[doc(hidden)]
#[macro_export]
macro_rules! bail {
    ($e:expr) => {
        return Err($crate::errors::KmhError::Message($e.to_owned()));
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::errors::KmhError::Message(format!($fmt, $($arg)*)))
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! format_err {
    ($($arg:tt)*) => { $crate::errors::KmhError::Message(format!($($arg)*)) }
}
