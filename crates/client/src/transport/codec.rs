//! gRPC-web framing
//!
//! Each frame is `flag (1) || length (4, big endian) || payload`. Flag
//! `0x00` carries a message; flag `0x80` carries the trailer block of
//! `name: value\r\n` lines with `grpc-status` and `grpc-message`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Code, Frame, Status};

pub const MESSAGE_FLAG: u8 = 0x00;
pub const TRAILER_FLAG: u8 = 0x80;
const HEADER_SIZE: usize = 5;
/// Upper bound on a single frame
const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("unknown frame flag {0:#04x}")]
    Flag(u8),
    #[error("frame of {0} bytes exceeds limit")]
    TooLarge(usize),
    #[error("malformed trailer: {0}")]
    Trailer(String),
}

fn encode(flag: u8, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_u8(flag);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

pub fn encode_message(payload: &[u8]) -> Bytes {
    encode(MESSAGE_FLAG, payload)
}

pub fn encode_trailer(status: &Status) -> Bytes {
    let block = format!(
        "grpc-status: {}\r\ngrpc-message: {}\r\n",
        status.code.as_i32(),
        percent_encode(&status.message)
    );
    encode(TRAILER_FLAG, block.as_bytes())
}

/// Parse a trailer block (also used for trailers-only responses in headers)
pub fn parse_trailer<'a>(
    lines: impl Iterator<Item = (&'a str, &'a str)>,
) -> Result<Status, CodecError> {
    let mut code = None;
    let mut message = String::new();
    for (name, value) in lines {
        match name.trim().to_ascii_lowercase().as_str() {
            "grpc-status" => {
                let value: i32 = value
                    .trim()
                    .parse()
                    .map_err(|_| CodecError::Trailer(format!("bad grpc-status {:?}", value)))?;
                code = Some(Code::from_i32(value));
            }
            "grpc-message" => message = percent_decode(value.trim()),
            _ => {}
        }
    }
    let code = code.ok_or_else(|| CodecError::Trailer("missing grpc-status".into()))?;
    Ok(Status::new(code, message))
}

/// Incremental decoder over a byte stream split at arbitrary points
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes received but not yet decoded
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// The next complete frame, `None` until one is buffered
    pub fn next_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        if self.buf.len() < HEADER_SIZE {
            return Ok(None);
        }
        let flag = self.buf[0];
        let len = u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(CodecError::TooLarge(len));
        }
        if self.buf.len() < HEADER_SIZE + len {
            return Ok(None);
        }

        self.buf.advance(HEADER_SIZE);
        let payload = self.buf.split_to(len).freeze();
        match flag {
            MESSAGE_FLAG => Ok(Some(Frame::Message(payload))),
            TRAILER_FLAG => {
                let text = std::str::from_utf8(&payload)
                    .map_err(|e| CodecError::Trailer(e.to_string()))?;
                let lines = text
                    .split("\r\n")
                    .filter(|line| !line.is_empty())
                    .filter_map(|line| line.split_once(':'));
                Ok(Some(Frame::End(parse_trailer(lines)?)))
            }
            other => Err(CodecError::Flag(other)),
        }
    }
}

fn percent_encode(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for byte in message.bytes() {
        if (0x20..0x7f).contains(&byte) && byte != b'%' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn percent_decode(message: &str) -> String {
    let bytes = message.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_split_across_chunks() {
        let mut wire = BytesMut::new();
        wire.extend_from_slice(&encode_message(b"first"));
        wire.extend_from_slice(&encode_message(b""));
        wire.extend_from_slice(&encode_trailer(&Status::new(
            Code::NotFound,
            "thread not found",
        )));

        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for chunk in wire.chunks(3) {
            decoder.push(chunk);
            while let Some(frame) = decoder.next_frame().unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(
            frames,
            vec![
                Frame::Message(Bytes::from_static(b"first")),
                Frame::Message(Bytes::new()),
                Frame::End(Status::new(Code::NotFound, "thread not found")),
            ]
        );
        assert_eq!(decoder.remaining(), 0);
    }

    #[test]
    fn test_trailer_message_escaping() {
        let status = Status::new(Code::Internal, "100% broken\nbadly");
        let mut decoder = FrameDecoder::new();
        decoder.push(&encode_trailer(&status));
        assert_eq!(decoder.next_frame().unwrap(), Some(Frame::End(status)));
    }

    #[test]
    fn test_rejects_unknown_flag() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&[0x01, 0, 0, 0, 0]);
        assert_eq!(decoder.next_frame(), Err(CodecError::Flag(0x01)));
    }

    #[test]
    fn test_trailer_requires_status() {
        assert!(parse_trailer([("grpc-message", "oops")].into_iter()).is_err());
        let status = parse_trailer([("Grpc-Status", " 16 ")].into_iter()).unwrap();
        assert_eq!(status.code, Code::Unauthenticated);
    }
}
