use clap::Args;

use client::NewThreadOptions;
use common::prelude::Addr;

use super::{describe, parse_key, ThreadError};

#[derive(Args, Debug, Clone)]
pub struct Add {
    /// Address of the thread on a peer
    pub addr: Addr,

    /// Thread key as printed by `thread get` on the inviting peer
    #[arg(long)]
    pub key: String,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Add {
    type Error = ThreadError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session().await?;
        let opts = NewThreadOptions::default().with_thread_key(parse_key(&self.key)?);

        let info = session.network.add_thread(&self.addr, opts, None).await?;
        tracing::info!("joined thread {}", info.id);
        session.network.close().await?;
        Ok(describe(&info))
    }
}
