use clap::Args;

use common::prelude::{Addr, ThreadId};

use super::ThreadError;

#[derive(Args, Debug, Clone)]
pub struct Replicator {
    pub id: ThreadId,

    /// Address of the peer to replicate to
    pub addr: Addr,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Replicator {
    type Error = ThreadError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session().await?;
        let peer = session
            .network
            .add_replicator(&self.id, &self.addr, None)
            .await?;
        session.network.close().await?;
        Ok(format!("Replicating {} to {}", self.id, peer))
    }
}
