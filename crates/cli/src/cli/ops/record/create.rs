use clap::Args;

use common::prelude::{Block, ThreadId};

use super::RecordOpError;

#[derive(Args, Debug, Clone)]
pub struct Create {
    pub thread: ThreadId,

    /// Record body as JSON, stored as DAG-CBOR
    pub body: String,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Create {
    type Error = RecordOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let value: serde_json::Value = serde_json::from_str(&self.body)?;
        let body = Block::encode(&value)?;

        let session = ctx.session().await?;
        let created = session
            .network
            .create_record(&self.thread, &body, None)
            .await?;
        session.network.close().await?;

        let cid = created
            .record
            .as_ref()
            .map(|record| record.cid().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(format!("Record {} in log {}", cid, created.log_id))
    }
}
