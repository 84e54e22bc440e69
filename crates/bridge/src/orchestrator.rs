//! 中继桥编排器
//!
//! 消费任务先起、发布随后进行，两端靠预期消息数对齐：
//! relay在消费端取满整个批次后才返回。

use std::sync::Arc;

use relay_core::{ExtractedRecord, RelayError, RelayResult};
use tracing::info;

use crate::consumer::{ConsumeReport, RecordConsumer};
use crate::publisher::RecordPublisher;

/// 中继桥编排器
pub struct BridgeOrchestrator {
    publisher: RecordPublisher,
    consumer: Arc<RecordConsumer>,
}

impl BridgeOrchestrator {
    pub fn new(publisher: RecordPublisher, consumer: Arc<RecordConsumer>) -> Self {
        Self {
            publisher,
            consumer,
        }
    }

    /// 把一个批次的记录经代理转运并落库，返回消费侧统计
    pub async fn relay(&self, records: Vec<ExtractedRecord>) -> RelayResult<ConsumeReport> {
        let expected = records.len();
        if expected == 0 {
            return Ok(ConsumeReport::default());
        }

        let consumer = Arc::clone(&self.consumer);
        let drain_task = tokio::spawn(async move { consumer.drain(expected).await });

        self.publisher.publish_records(records).await?;

        let report = drain_task
            .await
            .map_err(|e| RelayError::Internal(format!("消费任务异常结束: {e}")))??;

        info!(
            consumed = report.consumed,
            enqueued = report.enqueued,
            "批次转运完成"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use relay_core::DispatchQueue;
    use relay_infrastructure::{MemoryBroker, MemoryDispatchQueue, MemoryRepository};

    #[tokio::test]
    async fn test_relay_waits_for_full_batch() {
        let broker = Arc::new(MemoryBroker::new());
        let repository = Arc::new(MemoryRepository::new());
        let queue = Arc::new(MemoryDispatchQueue::new("q", 100));

        let publisher = RecordPublisher::new(broker.clone(), "email-chunks");
        let consumer = Arc::new(RecordConsumer::new(
            broker,
            repository,
            queue.clone(),
            "email-chunks",
            Duration::from_millis(5),
        ));
        let orchestrator = BridgeOrchestrator::new(publisher, consumer);

        let records: Vec<ExtractedRecord> = (1..=3)
            .map(|id| ExtractedRecord {
                id,
                author: Some(format!("author-{}", id)),
                content: Some("<p>hi</p>".to_string()),
                emails: vec![format!("a{}@example.com", id)],
                phone_numbers: vec![],
                linkedin_url: None,
            })
            .collect();

        let report = orchestrator.relay(records).await.unwrap();
        assert_eq!(report.consumed, 3);
        assert_eq!(report.resolved, 3);
        assert_eq!(queue.length().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_relay_empty_batch_returns_immediately() {
        let broker = Arc::new(MemoryBroker::new());
        let publisher = RecordPublisher::new(broker.clone(), "email-chunks");
        let consumer = Arc::new(RecordConsumer::new(
            broker,
            Arc::new(MemoryRepository::new()),
            Arc::new(MemoryDispatchQueue::new("q", 100)),
            "email-chunks",
            Duration::from_millis(5),
        ));
        let orchestrator = BridgeOrchestrator::new(publisher, consumer);

        let report = orchestrator.relay(vec![]).await.unwrap();
        assert_eq!(report.consumed, 0);
    }
}
