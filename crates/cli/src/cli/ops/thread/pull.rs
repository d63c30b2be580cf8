use clap::Args;

use common::prelude::ThreadId;

use super::ThreadError;

#[derive(Args, Debug, Clone)]
pub struct Pull {
    pub id: ThreadId,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Pull {
    type Error = ThreadError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session().await?;
        session.network.pull_thread(&self.id, None).await?;
        session.network.close().await?;
        Ok(format!("Pulled {}", self.id))
    }
}
