use clap::Args;

use client::Error;
use common::prelude::{Cid, ThreadId};

use super::RecordOpError;

#[derive(Args, Debug, Clone)]
pub struct Get {
    pub thread: ThreadId,
    pub cid: Cid,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Get {
    type Error = RecordOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session().await?;
        let record = session
            .network
            .get_record(&self.thread, &self.cid, None)
            .await?;
        let read_key = session
            .network
            .keys()
            .read_key(&self.thread)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| Error::MissingKey(self.thread.clone()))?;
        session.network.close().await?;

        let header = record.event().header(&read_key)?;
        let body: serde_json::Value = record.event().decode_body(&read_key)?;
        Ok(format!(
            "Record {} by {} at {}\n{}",
            record.cid(),
            record.log_id(),
            header.time.to_rfc3339(),
            serde_json::to_string_pretty(&body)?
        ))
    }
}
