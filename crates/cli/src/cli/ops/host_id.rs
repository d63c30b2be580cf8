use clap::Args;

use crate::cli::op::SessionError;

#[derive(Args, Debug, Clone)]
pub struct HostId;

#[async_trait::async_trait]
impl crate::cli::op::Op for HostId {
    type Error = SessionError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session().await?;
        let peer = session.network.get_host_id(None).await?;
        session.network.close().await?;
        Ok(peer.to_string())
    }
}
