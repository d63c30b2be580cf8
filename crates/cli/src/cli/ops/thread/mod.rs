use clap::{Args, Subcommand};

use common::linked_data::multibase::{self, Base};
use common::prelude::{ThreadInfo, ThreadKey};

use crate::cli::op::{Op, SessionError};

pub mod add;
pub mod create;
pub mod delete;
pub mod get;
pub mod pull;
pub mod replicator;

crate::command_enum! {
    (Create, create::Create),
    (Add, add::Add),
    (Get, get::Get),
    (Pull, pull::Pull),
    (Delete, delete::Delete),
    (Replicator, replicator::Replicator),
}

pub type ThreadCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Thread {
    #[command(subcommand)]
    pub command: ThreadCommand,
}

#[async_trait::async_trait]
impl Op for Thread {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ThreadError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Client(#[from] client::Error),
    #[error("invalid thread key: {0}")]
    InvalidKey(String),
}

/// Thread keys as passed between peers out of band
pub fn format_key(key: &ThreadKey) -> String {
    multibase::encode(Base::Base32Lower, key.to_bytes())
}

pub fn parse_key(text: &str) -> Result<ThreadKey, ThreadError> {
    let (_, bytes) = multibase::decode(text).map_err(|e| ThreadError::InvalidKey(e.to_string()))?;
    ThreadKey::from_bytes(&bytes).map_err(|e| ThreadError::InvalidKey(e.to_string()))
}

pub fn describe(info: &ThreadInfo) -> String {
    let mut lines = vec![format!("Thread: {}", info.id)];
    match &info.key {
        Some(key) => {
            let access = if key.can_read() { "read" } else { "service only" };
            lines.push(format!("Key ({}): {}", access, format_key(key)));
        }
        None => lines.push("Key: none".to_string()),
    }
    for addr in &info.addrs {
        lines.push(format!("Addr: {}", addr));
    }
    for log in info.logs.values() {
        let owner = if log.is_owned() { " (ours)" } else { "" };
        let head = log
            .head
            .map(|cid| cid.to_string())
            .unwrap_or_else(|| "empty".to_string());
        lines.push(format!("Log {}{}: head {}", log.id, owner, head));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::prelude::{LogInfo, SecretKey, ThreadId, Variant};

    #[test]
    fn test_key_text_roundtrip() {
        let key = ThreadKey::generate(true);
        assert_eq!(parse_key(&format_key(&key)).unwrap(), key);
        assert!(matches!(
            parse_key("not a key"),
            Err(ThreadError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_describe_marks_owned_log() {
        let mut info = ThreadInfo::new(
            ThreadId::random(Variant::Raw, 32),
            Some(ThreadKey::generate(false)),
        );
        let log = LogInfo::owned(SecretKey::generate());
        info.insert_log(log.clone());

        let text = describe(&info);
        assert!(text.contains("service only"));
        assert!(text.contains(&format!("Log {} (ours): head empty", log.id)));
    }
}
