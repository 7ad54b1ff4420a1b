//! Errors reported by the operations in this crate.

use {
    std::{fmt, io, os::unix::io::RawFd},
    thiserror::Error,
};

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Operation during which an error occurred.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation
{
    Read,
    Write,
    SendFd,
    RecvFd,
    SetHandler,
}

impl fmt::Display for Operation
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        let name = match self {
            Self::Read       => "read",
            Self::Write      => "write",
            Self::SendFd     => "send descriptor",
            Self::RecvFd     => "receive descriptor",
            Self::SetHandler => "set signal handler",
        };
        f.write_str(name)
    }
}

/// Error returned by the operations in this crate.
///
/// Each variant records the operation and descriptor involved.
/// Use [`kind`][`Self::kind`] to branch on the class of failure.
#[derive(Debug, Error)]
pub enum Error
{
    /// The deadline elapsed before the operation completed.
    #[error("{op} on fd {fd}: timed out")]
    Timeout{op: Operation, fd: RawFd},

    /// The peer closed before the requested amount was transferred.
    #[error("{op} on fd {fd}: peer disconnected")]
    Disconnected{op: Operation, fd: RawFd},

    /// The peer sent malformed control data.
    #[error("{op} on fd {fd}: protocol violation: {reason}")]
    Protocol{op: Operation, fd: RawFd, reason: &'static str},

    /// Any other failure reported by the operating system.
    #[error("{op} on fd {fd}: {source}")]
    Io{op: Operation, fd: RawFd, #[source] source: io::Error},

    /// A required descriptor or reactor registration could not be acquired.
    #[error("{what}: {source}")]
    Construction{what: &'static str, #[source] source: io::Error},
}

/// Class of an [`Error`], without context.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind
{
    Timeout,
    Disconnected,
    Protocol,
    Io,
    Construction,
}

impl ErrorKind
{
    /// Whether the caller may reasonably retry or carry on.
    ///
    /// Timeouts and disconnects are expected during normal operation.
    /// The other kinds indicate a misbehaving peer or a broken environment.
    pub fn is_recoverable(self) -> bool
    {
        matches!(self, Self::Timeout | Self::Disconnected)
    }
}

impl Error
{
    /// The class of this error.
    pub fn kind(&self) -> ErrorKind
    {
        match self {
            Self::Timeout{..}      => ErrorKind::Timeout,
            Self::Disconnected{..} => ErrorKind::Disconnected,
            Self::Protocol{..}     => ErrorKind::Protocol,
            Self::Io{..}           => ErrorKind::Io,
            Self::Construction{..} => ErrorKind::Construction,
        }
    }

    /// The OS error code, if this error carries one.
    pub fn raw_os_error(&self) -> Option<i32>
    {
        match self {
            Self::Io{source, ..} | Self::Construction{source, ..} =>
                source.raw_os_error(),
            _ => None,
        }
    }
}

impl From<Error> for io::Error
{
    fn from(other: Error) -> Self
    {
        use io::ErrorKind as K;
        let kind = match &other {
            Error::Timeout{..}        => K::TimedOut,
            Error::Disconnected{..}   => K::UnexpectedEof,
            Error::Protocol{..}       => K::InvalidData,
            Error::Io{source, ..}
            | Error::Construction{source, ..} => source.kind(),
        };
        io::Error::new(kind, other)
    }
}
