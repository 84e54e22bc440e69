//! 记录消费端
//!
//! 从主题拉取记录，逐条解析落库。仓储的find-or-create不具备
//! 并发去重能力，消费侧因此严格串行：一条记录的全部落库调用
//! 完成之后才开始下一条。每个 (content, email) 组合在落库后
//! 立即进入派发队列。

use std::sync::Arc;
use std::time::Duration;

use relay_core::{
    DispatchItem, DispatchQueue, ExtractedRecord, RelayBroker, RelayError, RelayResult, Repository,
};
use tracing::{debug, info, warn};

/// 一次drain的统计
#[derive(Debug, Clone, Default)]
pub struct ConsumeReport {
    /// 从主题取下的消息数
    pub consumed: usize,
    /// 成功落库的记录数
    pub resolved: usize,
    /// 解析失败或缺少作者而跳过的记录数
    pub skipped: usize,
    /// 进入派发队列的投递项数
    pub enqueued: usize,
}

/// 记录消费端
pub struct RecordConsumer {
    broker: Arc<dyn RelayBroker>,
    repository: Arc<dyn Repository>,
    queue: Arc<dyn DispatchQueue>,
    topic: String,
    poll_interval: Duration,
}

impl RecordConsumer {
    pub fn new(
        broker: Arc<dyn RelayBroker>,
        repository: Arc<dyn Repository>,
        queue: Arc<dyn DispatchQueue>,
        topic: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            broker,
            repository,
            queue,
            topic: topic.into(),
            poll_interval,
        }
    }

    /// 持续消费直到累计取下expected条消息
    ///
    /// 单条记录失败只记入统计，不中断整体进度；
    /// 主题暂时为空时按poll_interval等待后重试。
    pub async fn drain(&self, expected: usize) -> RelayResult<ConsumeReport> {
        let mut report = ConsumeReport::default();

        while report.consumed < expected {
            let messages = self.broker.consume(&self.topic).await?;
            if messages.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            for message in messages {
                report.consumed += 1;
                match self.resolve_record(&message.record).await {
                    Ok(enqueued) => {
                        report.resolved += 1;
                        report.enqueued += enqueued;
                    }
                    Err(e) => {
                        warn!(
                            record_id = message.record.id,
                            error = %e,
                            "记录落库失败，跳过"
                        );
                        report.skipped += 1;
                    }
                }
            }
        }

        info!(
            topic = %self.topic,
            consumed = report.consumed,
            resolved = report.resolved,
            skipped = report.skipped,
            enqueued = report.enqueued,
            "主题消费完成"
        );
        Ok(report)
    }

    /// 单条记录的串行落库，返回进入队列的投递项数
    async fn resolve_record(&self, record: &ExtractedRecord) -> RelayResult<usize> {
        let author_name = match record.author.as_deref().filter(|n| !n.trim().is_empty()) {
            Some(name) => name,
            None => {
                debug!(record_id = record.id, "记录缺少作者，跳过");
                return Err(RelayError::repository_error(format!(
                    "记录 {} 缺少作者",
                    record.id
                )));
            }
        };

        let author_id = self
            .repository
            .find_or_create_author(author_name, record.linkedin_url.as_deref())
            .await?;

        let mut email_ids = Vec::with_capacity(record.emails.len());
        for address in &record.emails {
            let email_id = self.repository.find_or_create_email(address).await?;
            self.repository
                .link_author_email(author_id, email_id)
                .await?;
            email_ids.push(email_id);
        }

        for number in &record.phone_numbers {
            let phone_id = self.repository.find_or_create_phone(number).await?;
            self.repository
                .link_author_phone(author_id, phone_id)
                .await?;
        }

        let body = match record.content.as_deref().filter(|c| !c.is_empty()) {
            Some(body) if !email_ids.is_empty() => body,
            _ => {
                debug!(record_id = record.id, "记录无正文或无邮箱，不生成投递项");
                return Ok(0);
            }
        };

        let content_id = self.repository.create_content(author_id, body).await?;

        let mut enqueued = 0;
        for email_id in email_ids {
            self.repository
                .create_pending_delivery(content_id, email_id)
                .await?;
            let item = DispatchItem::new(content_id, email_id);
            match self.queue.push(&item).await {
                Ok(()) => enqueued += 1,
                // 队列满不是记录级失败，落库已完成，投递项丢弃
                Err(RelayError::QueueFull { queue, capacity }) => {
                    warn!(
                        content_id,
                        email_id,
                        queue = %queue,
                        capacity,
                        "派发队列已满，投递项丢弃"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(enqueued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::RecordMessage;
    use relay_infrastructure::{MemoryBroker, MemoryDispatchQueue, MemoryRepository};

    fn record(id: i64, author: Option<&str>, emails: &[&str]) -> ExtractedRecord {
        ExtractedRecord {
            id,
            author: author.map(String::from),
            content: Some("<p>hello</p>".to_string()),
            emails: emails.iter().map(|e| e.to_string()).collect(),
            phone_numbers: vec![],
            linkedin_url: None,
        }
    }

    fn consumer(
        broker: Arc<MemoryBroker>,
        repository: Arc<MemoryRepository>,
        queue: Arc<MemoryDispatchQueue>,
    ) -> RecordConsumer {
        RecordConsumer::new(
            broker,
            repository,
            queue,
            "email-chunks",
            Duration::from_millis(5),
        )
    }

    #[tokio::test]
    async fn test_drain_resolves_and_enqueues() {
        let broker = Arc::new(MemoryBroker::new());
        let repository = Arc::new(MemoryRepository::new());
        let queue = Arc::new(MemoryDispatchQueue::new("q", 100));

        broker
            .publish_batch(
                "email-chunks",
                &[
                    RecordMessage {
                        key: "0".to_string(),
                        record: record(1, Some("Alice"), &["a@example.com", "b@example.com"]),
                    },
                    RecordMessage {
                        key: "1".to_string(),
                        record: record(2, Some("Bob"), &["c@example.com"]),
                    },
                ],
            )
            .await
            .unwrap();

        let consumer = consumer(broker, repository.clone(), queue.clone());
        let report = consumer.drain(2).await.unwrap();

        assert_eq!(report.consumed, 2);
        assert_eq!(report.resolved, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.enqueued, 3);
        assert_eq!(queue.length().await.unwrap(), 3);

        // 队首投递项可正常回查状态
        let item = queue.pop().await.unwrap().unwrap();
        let status = repository
            .delivery_status(item.content_id, item.email_id)
            .await
            .unwrap();
        assert!(!status.sent);
    }

    #[tokio::test]
    async fn test_record_without_author_is_skipped() {
        let broker = Arc::new(MemoryBroker::new());
        let repository = Arc::new(MemoryRepository::new());
        let queue = Arc::new(MemoryDispatchQueue::new("q", 100));

        broker
            .publish_batch(
                "email-chunks",
                &[
                    RecordMessage {
                        key: "0".to_string(),
                        record: record(1, None, &["a@example.com"]),
                    },
                    RecordMessage {
                        key: "1".to_string(),
                        record: record(2, Some("Bob"), &["b@example.com"]),
                    },
                ],
            )
            .await
            .unwrap();

        let consumer = consumer(broker, repository, queue.clone());
        let report = consumer.drain(2).await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.resolved, 1);
        assert_eq!(queue.length().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_queue_full_drops_item_but_keeps_record() {
        let broker = Arc::new(MemoryBroker::new());
        let repository = Arc::new(MemoryRepository::new());
        let queue = Arc::new(MemoryDispatchQueue::new("q", 1));

        broker
            .publish_batch(
                "email-chunks",
                &[RecordMessage {
                    key: "0".to_string(),
                    record: record(1, Some("Alice"), &["a@example.com", "b@example.com"]),
                }],
            )
            .await
            .unwrap();

        let consumer = consumer(broker, repository, queue.clone());
        let report = consumer.drain(1).await.unwrap();

        assert_eq!(report.resolved, 1);
        assert_eq!(report.enqueued, 1);
        assert_eq!(queue.length().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_record_without_content_creates_no_delivery() {
        let broker = Arc::new(MemoryBroker::new());
        let repository = Arc::new(MemoryRepository::new());
        let queue = Arc::new(MemoryDispatchQueue::new("q", 100));

        let mut r = record(1, Some("Alice"), &["a@example.com"]);
        r.content = None;
        broker
            .publish_batch(
                "email-chunks",
                &[RecordMessage {
                    key: "0".to_string(),
                    record: r,
                }],
            )
            .await
            .unwrap();

        let consumer = consumer(broker, repository, queue.clone());
        let report = consumer.drain(1).await.unwrap();

        assert_eq!(report.resolved, 1);
        assert_eq!(report.enqueued, 0);
        assert_eq!(queue.length().await.unwrap(), 0);
    }
}
