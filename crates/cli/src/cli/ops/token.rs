use clap::Args;

use crate::cli::op::SessionError;

#[derive(Args, Debug, Clone)]
pub struct Token;

#[async_trait::async_trait]
impl crate::cli::op::Op for Token {
    type Error = SessionError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut session = ctx.session().await?;
        let identity = session.identity()?;

        let token = session.network.get_token(&identity, None).await?;
        tracing::info!("obtained token for {}", identity.public());

        session.state.config.token = Some(token.as_str().to_string());
        session.state.save_config()?;
        session.network.close().await?;
        Ok(token.to_string())
    }
}
