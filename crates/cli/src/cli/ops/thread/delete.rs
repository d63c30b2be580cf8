use clap::Args;

use common::prelude::ThreadId;

use super::ThreadError;

#[derive(Args, Debug, Clone)]
pub struct Delete {
    pub id: ThreadId,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Delete {
    type Error = ThreadError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session().await?;
        session.network.delete_thread(&self.id, None).await?;
        tracing::info!("deleted thread {}", self.id);
        session.network.close().await?;
        Ok(format!("Deleted {} and its local keys", self.id))
    }
}
