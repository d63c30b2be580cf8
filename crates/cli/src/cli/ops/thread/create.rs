use clap::Args;

use client::NewThreadOptions;
use common::prelude::{ThreadId, ThreadKey, Variant};

use super::{describe, ThreadError};

#[derive(Args, Debug, Clone)]
pub struct Create {
    /// Thread id (random if omitted)
    #[arg(long)]
    pub id: Option<ThreadId>,

    /// Create the thread without a read key
    #[arg(long)]
    pub service_only: bool,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Create {
    type Error = ThreadError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session().await?;
        let id = self
            .id
            .clone()
            .unwrap_or_else(|| ThreadId::random(Variant::Raw, 32));
        let opts = NewThreadOptions::default()
            .with_thread_key(ThreadKey::generate(!self.service_only));

        let info = session.network.create_thread(&id, opts, None).await?;
        tracing::info!("created thread {}", id);
        session.network.close().await?;
        Ok(describe(&info))
    }
}
