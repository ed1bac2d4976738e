use std::collections::TryReserveError;

use nix::errno::Errno;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Definition of errors that might be returned by BOB functionality.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// Input / output error occurred.
    #[error("input/output error: {0}")]
    Io(Errno),
    /// Header, varint or record data violates the file format.
    #[error("illegal byte sequence")]
    Corrupt,
    /// File already exists.
    #[error("file already exists")]
    EntryAlreadyExisted,
    /// No memory available for completing request.
    #[error("out of memory")]
    NoMemory,
    /// Incorrect value specified to function.
    #[error("invalid argument")]
    Invalid,
}

impl From<Errno> for Error {
    fn from(errno: Errno) -> Self {
        match errno {
            Errno::EEXIST => Error::EntryAlreadyExisted,
            Errno::ENOMEM => Error::NoMemory,
            Errno::EILSEQ => Error::Corrupt,
            Errno::EINVAL => Error::Invalid,
            _ => Error::Io(errno),
        }
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::NoMemory
    }
}
