use clap::{Args, Subcommand};

use common::linked_data::BlockError;
use common::record::RecordError;

use crate::cli::op::{Op, SessionError};

pub mod create;
pub mod get;

crate::command_enum! {
    (Create, create::Create),
    (Get, get::Get),
}

pub type RecordCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Record {
    #[command(subcommand)]
    pub command: RecordCommand,
}

#[async_trait::async_trait]
impl Op for Record {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecordOpError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Client(#[from] client::Error),
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error("cannot read record: {0}")]
    Record(#[from] RecordError),
}
