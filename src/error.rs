use core::fmt;
use std::io;

/// Library-wide error for tdigest-sketch.
#[derive(Debug)]
pub enum TdError {
    /// Caller supplied an unusable argument (k below minimum, rank outside
    /// [0, 1], non-finite sample value). `context` pinpoints the argument.
    InvalidArgument { context: &'static str },

    /// Serialized input does not describe a valid digest: unrecognized
    /// version or sketch type, impossible lengths, inconsistent weights,
    /// truncated payload.
    Format(String),

    /// Stream read/write failure. The underlying cause is preserved and
    /// reachable through `source()`.
    Io(io::Error),

    /// Requested serialized size exceeds the limits of the binary format.
    Capacity { requested: usize, limit: usize },
}

impl TdError {
    pub(crate) fn invalid_argument(context: &'static str) -> Self {
        TdError::InvalidArgument { context }
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        TdError::Format(msg.into())
    }

    pub(crate) fn capacity(requested: usize, limit: usize) -> Self {
        TdError::Capacity { requested, limit }
    }
}

impl fmt::Display for TdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TdError::InvalidArgument { context } => {
                write!(f, "tdigest: invalid argument: {}", context)
            }
            TdError::Format(msg) => write!(f, "tdigest: malformed serialized digest: {}", msg),
            TdError::Io(err) => write!(f, "tdigest: i/o failure: {}", err),
            TdError::Capacity { requested, limit } => write!(
                f,
                "tdigest: serialized size {} exceeds the format limit of {} bytes",
                requested, limit
            ),
        }
    }
}

impl std::error::Error for TdError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TdError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for TdError {
    fn from(err: io::Error) -> Self {
        TdError::Io(err)
    }
}

pub type TdResult<T> = Result<T, TdError>;
