use clap::Args;

use client::SubscriptionEvent;
use common::prelude::ThreadId;

use crate::cli::op::SessionError;

#[derive(Args, Debug, Clone)]
pub struct Subscribe {
    /// Threads to follow (all threads if none given)
    pub threads: Vec<ThreadId>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Subscribe {
    type Error = SessionError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session().await?;
        let mut sub = session.network.subscribe(&self.threads, None).await?;
        let closer = sub.closer();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                closer.close();
            }
        });

        let mut delivered = 0usize;
        let mut failed = 0usize;
        let ending = loop {
            match sub.next().await {
                Some(SubscriptionEvent::Delivered(record)) => {
                    delivered += 1;
                    let cid = record
                        .record
                        .as_ref()
                        .map(|record| record.cid().to_string())
                        .unwrap_or_default();
                    println!("{} {} {}", record.thread_id, record.log_id, cid);
                }
                Some(SubscriptionEvent::Failed(e)) => {
                    failed += 1;
                    tracing::warn!("skipped a record: {}", e);
                }
                Some(SubscriptionEvent::Closed(None)) => break "stream ended".to_string(),
                Some(SubscriptionEvent::Closed(Some(e))) => break format!("stream failed: {}", e),
                None => break "closed".to_string(),
            }
        };
        session.network.close().await?;

        Ok(format!(
            "Subscription {}: {} delivered, {} failed",
            ending, delivered, failed
        ))
    }
}
