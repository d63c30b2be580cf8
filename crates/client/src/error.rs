use common::keybook::KeyBookError;
use common::linked_data::BlockError;
use common::record::RecordError;
use common::thread::{IdError, LogId, ThreadId};

use crate::transport::{CallError, Code, Status};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The token handshake failed, or the service rejected the token
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("key does not derive log {0}")]
    KeyMismatch(LogId),
    #[error("no usable key held for thread {0}")]
    MissingKey(ThreadId),
    #[error("missing value: {0}")]
    MissingValue(String),
    #[error("storage error: {0}")]
    Storage(String),
    /// Any other non-OK status returned by the service
    #[error("remote error: {0}")]
    Remote(Status),
    /// The call failed before the service produced a status
    #[error("transport error: {0}")]
    Transport(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl Error {
    pub(crate) fn from_status(status: Status) -> Self {
        match status.code {
            Code::NotFound => Error::NotFound(status.message),
            Code::Unauthenticated | Code::PermissionDenied => Error::Auth(status.message),
            _ => Error::Remote(status),
        }
    }
}

impl From<CallError> for Error {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Status(status) => Error::from_status(status),
            CallError::Transport(msg) => Error::Transport(msg),
        }
    }
}

impl From<KeyBookError> for Error {
    fn from(err: KeyBookError) -> Self {
        match err {
            KeyBookError::KeyMismatch(log) => Error::KeyMismatch(log),
            other => Error::Storage(other.to_string()),
        }
    }
}

impl From<RecordError> for Error {
    fn from(err: RecordError) -> Self {
        Error::Decode(err.to_string())
    }
}

impl From<BlockError> for Error {
    fn from(err: BlockError) -> Self {
        Error::Decode(err.to_string())
    }
}

impl From<IdError> for Error {
    fn from(err: IdError) -> Self {
        Error::Decode(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Decode(err.to_string())
    }
}
