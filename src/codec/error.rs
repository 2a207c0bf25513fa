use crate::proto::Error;

use std::{error, fmt, io};

/// Errors caused by sending a message
#[derive(Debug)]
pub enum SendError {
    Connection(Error),
    User(UserError),
}

/// Errors caused by users of the library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserError {
    /// The stream ID space is exhausted; a new connection is required.
    OverflowedStreamId,

    /// Illegal headers, such as connection-specific headers or an invalid
    /// pseudo-header set.
    MalformedHeaders,

    /// Request submitted with a relative URI.
    MissingUriSchemeAndAuthority,

    /// The peer sent GOAWAY, or the connection is shutting down; no new
    /// streams are accepted.
    Rejected,

    /// The peer's MAX_CONCURRENT_STREAMS limit has been reached.
    StreamLimitReached,

    /// A DATA frame exceeding the peer's advertised maximum frame size was
    /// handed to the codec.
    PayloadTooBig,
}

// ===== impl SendError =====

impl error::Error for SendError {}

impl fmt::Display for SendError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Connection(ref e) => e.fmt(fmt),
            Self::User(ref e) => e.fmt(fmt),
        }
    }
}

impl From<io::Error> for SendError {
    fn from(src: io::Error) -> Self {
        Self::Connection(src.into())
    }
}

// ===== impl UserError =====

impl error::Error for UserError {}

impl fmt::Display for UserError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use self::UserError::*;

        fmt.write_str(match *self {
            OverflowedStreamId => "stream ID overflowed",
            MalformedHeaders => "malformed headers",
            MissingUriSchemeAndAuthority => "request URI missing scheme and authority",
            Rejected => "refusing new streams; connection is going away",
            StreamLimitReached => "concurrent stream limit reached",
            PayloadTooBig => "frame payload exceeds the peer's maximum frame size",
        })
    }
}
