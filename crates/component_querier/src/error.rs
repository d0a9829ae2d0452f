//! Component querier custom error definition.

use std::{error::Error as StdError, fmt, io, net::AddrParseError, result};

/// A type alias for `Result<T, QuerierError>`.
pub type QuerierResult<T> = result::Result<T, QuerierError>;

/// An error that can occur while resolving a component id.
#[derive(Debug)]
pub struct QuerierError(Box<ErrorKind>);

impl QuerierError {
    /// A constructor for `QuerierError`.
    pub fn new(kind: ErrorKind) -> Self {
        QuerierError(Box::new(kind))
    }

    /// Helper function to build a new error with an [Other](ErrorKind::Other) ErrorKind.
    pub fn new_other(s: &str) -> Self {
        QuerierError::new(ErrorKind::Other(s.to_owned()))
    }

    /// Helper to flag an endpoint that could not be allocated or bound.
    pub fn socket_unavailable(s: &str) -> Self {
        QuerierError::new(ErrorKind::SocketUnavailable(s.to_owned()))
    }

    /// Helper to flag a record that could not be decoded from a stream.
    pub fn malformed(s: &str) -> Self {
        QuerierError::new(ErrorKind::MalformedRecord(s.to_owned()))
    }

    /// Return the specific type of this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    /// Unwrap this error into its underlying type.
    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// True for the malformed stream error the record scan stops on.
    pub fn is_malformed(&self) -> bool {
        match *self.0 {
            ErrorKind::MalformedRecord(_) => true,
            _ => false,
        }
    }
}

/// The specific type of an error.
#[derive(Debug)]
pub enum ErrorKind {
    /// An I/O error that occurred while operating a socket.
    Io(io::Error),
    /// An endpoint failed to allocate or bind, or was already closed.
    SocketUnavailable(String),
    /// No datagram arrived within a single wait window.
    PollTimeout,
    /// The poll attempt budget ran out without a datagram.
    PollExhausted { attempts: u32 },
    /// The readiness wait itself failed at the OS level.
    OsReadError(io::Error),
    /// A response record could not be decoded from the datagram.
    MalformedRecord(String),
    /// The sending endpoint refused to enable broadcast.
    BroadcastUnsupported(io::Error),
    /// The caller supplied deadline passed before an answer arrived.
    DeadlineExceeded,
    /// Invalid configuration value or document.
    Config(String),
    /// Yet undefined error.
    Other(String),
    /// Hints that destructuring should not be exhaustive.
    ///
    /// This enum may grow additional variants, so this makes sure clients
    /// don't count on exhaustive matching. (Otherwise, adding a new variant
    /// could break existing code.)
    #[doc(hidden)]
    __Nonexhaustive,
}

impl StdError for QuerierError {
    /// The lower-level source of this error, if any.
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self.0 {
            ErrorKind::Io(ref err) => Some(err),
            ErrorKind::OsReadError(ref err) => Some(err),
            ErrorKind::BroadcastUnsupported(ref err) => Some(err),
            ErrorKind::SocketUnavailable(ref _s)
            | ErrorKind::MalformedRecord(ref _s)
            | ErrorKind::Config(ref _s)
            | ErrorKind::Other(ref _s) => None,
            ErrorKind::PollTimeout
            | ErrorKind::PollExhausted { .. }
            | ErrorKind::DeadlineExceeded => None,
            _ => unreachable!(),
        }
    }
}

impl fmt::Display for QuerierError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self.0 {
            ErrorKind::Io(ref err) => err.fmt(f),
            ErrorKind::SocketUnavailable(ref s) => write!(f, "Socket unavailable: '{}'.", s),
            ErrorKind::PollTimeout => write!(f, "Timed out waiting for a datagram."),
            ErrorKind::PollExhausted { attempts } => {
                write!(f, "No datagram after {} poll attempts.", attempts)
            }
            ErrorKind::OsReadError(ref err) => write!(f, "Readiness wait failed: {}", err),
            ErrorKind::MalformedRecord(ref s) => write!(f, "Malformed record: '{}'.", s),
            ErrorKind::BroadcastUnsupported(ref err) => {
                write!(f, "Cannot enable broadcast on socket: {}", err)
            }
            ErrorKind::DeadlineExceeded => write!(f, "Query deadline exceeded."),
            ErrorKind::Config(ref s) => write!(f, "Invalid configuration: '{}'.", s),
            ErrorKind::Other(ref s) => write!(f, "Unknown error encountered: '{}'.", s),
            _ => unreachable!(),
        }
    }
}

impl From<io::Error> for QuerierError {
    fn from(err: io::Error) -> Self {
        QuerierError::new(ErrorKind::Io(err))
    }
}

impl From<AddrParseError> for QuerierError {
    fn from(err: AddrParseError) -> Self {
        QuerierError::new(ErrorKind::Config(format!("{}", err)))
    }
}

impl From<toml::de::Error> for QuerierError {
    fn from(err: toml::de::Error) -> Self {
        QuerierError::new(ErrorKind::Config(format!("{}", err)))
    }
}

impl From<String> for QuerierError {
    fn from(s: String) -> Self {
        QuerierError::new(ErrorKind::Other(s))
    }
}

impl From<&str> for QuerierError {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_should_expose_the_kind() {
        let err = QuerierError::malformed("short body");
        assert!(err.is_malformed());
        assert_eq!(format!("{}", err), "Malformed record: 'short body'.");

        let err: QuerierError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert!(!err.is_malformed());
        assert!(err.source().is_some());
    }

    #[test]
    fn it_should_report_exhausted_attempts() {
        let err = QuerierError::new(ErrorKind::PollExhausted { attempts: 6 });
        match err.into_kind() {
            ErrorKind::PollExhausted { attempts } => assert_eq!(attempts, 6),
            other => panic!("unexpected kind {:?}", other),
        }
    }
}
