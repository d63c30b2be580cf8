use clap::{Args, Subcommand};

use common::keybook::KeyBookError;

use crate::cli::op::{Op, SessionError};

crate::command_enum! {
    (List, List),
}

#[derive(Args, Debug, Clone)]
pub struct Keys {
    #[command(subcommand)]
    pub command: Command,
}

#[async_trait::async_trait]
impl Op for Keys {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeysError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    KeyBook(#[from] KeyBookError),
}

/// Threads and Logs with keys held locally
#[derive(Args, Debug, Clone)]
pub struct List;

#[async_trait::async_trait]
impl Op for List {
    type Error = KeysError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session().await?;
        let keys = session.network.keys();

        let mut lines = Vec::new();
        for thread in keys.threads().await? {
            let access = match keys.read_key(&thread).await? {
                Some(_) => "read",
                None => "service only",
            };
            lines.push(format!("{} ({})", thread, access));
            for log in keys.logs(&thread).await? {
                let owned = keys.priv_key(&thread, &log).await?.is_some();
                lines.push(format!("  {}{}", log, if owned { " (ours)" } else { "" }));
            }
        }
        keys.close().await?;

        if lines.is_empty() {
            return Ok("No keys found".to_string());
        }
        Ok(lines.join("\n"))
    }
}
