//! 记录发布端
//!
//! 把一个批次的全部记录一次性发布到主题。消息键取记录在批次
//! 内的序号，保证同一批次内的顺序可由消费侧还原。发布失败不
//! 重试，直接上抛由调用方决定批次命运。

use std::sync::Arc;

use relay_core::{ExtractedRecord, RecordMessage, RelayBroker, RelayResult};
use tracing::info;

/// 记录发布端
pub struct RecordPublisher {
    broker: Arc<dyn RelayBroker>,
    topic: String,
}

impl RecordPublisher {
    pub fn new(broker: Arc<dyn RelayBroker>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
        }
    }

    /// 整批发布，返回发布的消息数
    pub async fn publish_records(&self, records: Vec<ExtractedRecord>) -> RelayResult<usize> {
        let messages: Vec<RecordMessage> = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| RecordMessage {
                key: index.to_string(),
                record,
            })
            .collect();

        let count = messages.len();
        if count == 0 {
            return Ok(0);
        }

        self.broker.publish_batch(&self.topic, &messages).await?;
        info!(topic = %self.topic, count, "记录已发布到主题");
        Ok(count)
    }
}
