//! How calls reach the service
//!
//! Every operation is one of three call shapes over a named method:
//! unary, server-streaming (subscriptions) and duplex (the token handshake).
//! Payloads are opaque bytes at this layer.

mod codec;
mod http;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

pub use codec::{
    encode_message, encode_trailer, parse_trailer, CodecError, FrameDecoder, MESSAGE_FLAG,
    TRAILER_FLAG,
};
pub use http::{HttpConfig, HttpTransport, SERVICE_PATH};

use crate::context::Context;

/// gRPC status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl Code {
    pub fn from_i32(code: i32) -> Code {
        match code {
            0 => Code::Ok,
            1 => Code::Cancelled,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            Code::Ok => 0,
            Code::Cancelled => 1,
            Code::Unknown => 2,
            Code::InvalidArgument => 3,
            Code::DeadlineExceeded => 4,
            Code::NotFound => 5,
            Code::AlreadyExists => 6,
            Code::PermissionDenied => 7,
            Code::ResourceExhausted => 8,
            Code::FailedPrecondition => 9,
            Code::Aborted => 10,
            Code::OutOfRange => 11,
            Code::Unimplemented => 12,
            Code::Internal => 13,
            Code::Unavailable => 14,
            Code::DataLoss => 15,
            Code::Unauthenticated => 16,
        }
    }
}

/// Terminal status of a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn ok() -> Self {
        Self::new(Code::Ok, "")
    }

    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

/// One item of a streamed response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Message(Bytes),
    /// The service ended the stream; no frame follows
    End(Status),
    /// The connection failed mid-stream; no frame follows
    Broken(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error("{0}")]
    Status(Status),
    #[error("{0}")]
    Transport(String),
}

/// Inbound half of a streamed call
pub type FrameStream = flume::Receiver<Frame>;

/// Both halves of a duplex call
///
/// Dropping `sender` half-closes the request side.
#[derive(Debug)]
pub struct Duplex {
    pub sender: flume::Sender<Bytes>,
    pub frames: FrameStream,
}

#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// One request, one reply
    async fn unary(&self, ctx: &Context, method: &str, payload: Bytes) -> Result<Bytes, CallError>;

    /// One request, a stream of replies ending in [`Frame::End`] or [`Frame::Broken`]
    async fn server_stream(
        &self,
        ctx: &Context,
        method: &str,
        payload: Bytes,
    ) -> Result<FrameStream, CallError>;

    /// Interleaved requests and replies
    async fn duplex(&self, ctx: &Context, method: &str) -> Result<Duplex, CallError>;
}
