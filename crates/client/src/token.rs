//! Client half of the challenge-response token handshake
//!
//! ```text
//! client                        service
//!   ── Key(public key) ──────────►
//!   ◄──────────── Challenge(bytes) ──
//!   ── Signature(sig over bytes) ─►
//!   ◄──────────────── Token(token) ──
//! ```

use common::crypto::PublicKey;
use common::thread::ThreadToken;

use crate::error::Error;
use crate::messages::{GetTokenReply, GetTokenRequest};
use crate::transport::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitingChallenge,
    AwaitingResult,
    Done,
}

/// What the caller must do after feeding a reply into the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Sign exactly these bytes and send the signature
    Sign(Vec<u8>),
    Token(ThreadToken),
}

#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
}

impl Handshake {
    /// Begin a handshake, returning the opening message
    pub fn start(public_key: &PublicKey) -> (Self, GetTokenRequest) {
        let handshake = Self {
            state: HandshakeState::AwaitingChallenge,
        };
        (handshake, GetTokenRequest::Key(public_key.marshal()))
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn on_reply(&mut self, reply: GetTokenReply) -> Result<Step, Error> {
        match (self.state, reply) {
            (HandshakeState::AwaitingChallenge, GetTokenReply::Challenge(challenge)) => {
                self.state = HandshakeState::AwaitingResult;
                Ok(Step::Sign(challenge))
            }
            (HandshakeState::AwaitingResult, GetTokenReply::Token(token)) => {
                self.state = HandshakeState::Done;
                Ok(Step::Token(ThreadToken::new(token)))
            }
            (state, reply) => Err(Error::Auth(format!(
                "unexpected {:?} while {:?}",
                reply, state
            ))),
        }
    }

    /// The service ended the stream
    pub fn on_end(&self, status: Status) -> Error {
        if status.is_ok() {
            return Error::Auth(format!("stream closed while {:?}", self.state));
        }
        Error::Auth(status.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::crypto::SecretKey;
    use crate::transport::Code;

    #[test]
    fn test_happy_path() {
        let key = SecretKey::generate();
        let (mut handshake, opening) = Handshake::start(&key.public());
        assert_eq!(opening, GetTokenRequest::Key(key.public().marshal()));

        let step = handshake
            .on_reply(GetTokenReply::Challenge(vec![9; 32]))
            .unwrap();
        assert_eq!(step, Step::Sign(vec![9; 32]));
        assert_eq!(handshake.state(), HandshakeState::AwaitingResult);

        let step = handshake
            .on_reply(GetTokenReply::Token("tok".into()))
            .unwrap();
        assert_eq!(step, Step::Token(ThreadToken::new("tok")));
        assert_eq!(handshake.state(), HandshakeState::Done);
    }

    #[test]
    fn test_out_of_order_replies() {
        let key = SecretKey::generate();
        let (mut handshake, _) = Handshake::start(&key.public());
        assert!(matches!(
            handshake.on_reply(GetTokenReply::Token("early".into())),
            Err(Error::Auth(_))
        ));

        let (mut handshake, _) = Handshake::start(&key.public());
        handshake
            .on_reply(GetTokenReply::Challenge(vec![1]))
            .unwrap();
        assert!(handshake
            .on_reply(GetTokenReply::Challenge(vec![2]))
            .is_err());
    }

    #[test]
    fn test_end_carries_status_message() {
        let key = SecretKey::generate();
        let (handshake, _) = Handshake::start(&key.public());
        match handshake.on_end(Status::new(Code::Unauthenticated, "bad signature")) {
            Error::Auth(msg) => assert_eq!(msg, "bad signature"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
