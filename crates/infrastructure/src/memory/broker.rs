//! 内存消息代理
//!
//! 每个主题维护一条追加日志与消费游标，consume返回游标之后
//! 的全部消息并推进游标，与流式代理的行为对齐。

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use relay_core::{RecordMessage, RelayBroker, RelayError, RelayResult};

#[derive(Default)]
struct TopicState {
    messages: Vec<RecordMessage>,
    cursor: usize,
}

/// 内存消息代理
pub struct MemoryBroker {
    topics: Mutex<HashMap<String, TopicState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> RelayResult<std::sync::MutexGuard<'_, HashMap<String, TopicState>>> {
        self.topics
            .lock()
            .map_err(|_| RelayError::broker_error("memory broker lock poisoned"))
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelayBroker for MemoryBroker {
    async fn publish_batch(&self, topic: &str, messages: &[RecordMessage]) -> RelayResult<()> {
        let mut topics = self.lock()?;
        let state = topics.entry(topic.to_string()).or_default();
        state.messages.extend_from_slice(messages);
        Ok(())
    }

    async fn consume(&self, topic: &str) -> RelayResult<Vec<RecordMessage>> {
        let mut topics = self.lock()?;
        let state = topics.entry(topic.to_string()).or_default();
        let pending = state.messages[state.cursor..].to_vec();
        state.cursor = state.messages.len();
        Ok(pending)
    }

    async fn purge(&self, topic: &str) -> RelayResult<()> {
        let mut topics = self.lock()?;
        topics.remove(topic);
        Ok(())
    }
}
