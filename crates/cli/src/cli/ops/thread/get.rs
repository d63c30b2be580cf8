use clap::Args;

use common::prelude::ThreadId;

use super::{describe, ThreadError};

#[derive(Args, Debug, Clone)]
pub struct Get {
    pub id: ThreadId,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Get {
    type Error = ThreadError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session().await?;
        let info = session.network.get_thread(&self.id, None).await?;
        session.network.close().await?;
        Ok(describe(&info))
    }
}
