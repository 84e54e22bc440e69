use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use relay_core::{RecordMessage, RelayBroker, RelayError, RelayResult};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::connection::RedisConnectionManager;

/// 基于Redis Stream的中继代理
///
/// XADD按序追加，XRANGE从最早保留位点读取；每个主题的消费
/// 游标保存在进程内（单消费者假设）。
pub struct RedisStreamBroker {
    connection_manager: Arc<RedisConnectionManager>,
    /// 主题 → 最后已消费的Stream ID
    cursors: Mutex<HashMap<String, String>>,
}

impl RedisStreamBroker {
    pub fn new(connection_manager: Arc<RedisConnectionManager>) -> Self {
        Self {
            connection_manager,
            cursors: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RelayBroker for RedisStreamBroker {
    async fn publish_batch(&self, topic: &str, messages: &[RecordMessage]) -> RelayResult<()> {
        for message in messages {
            let json = message
                .serialize()
                .map_err(|e| RelayError::broker_error(format!("serialize message failed: {e}")))?;

            let mut cmd = redis::cmd("XADD");
            cmd.arg(topic)
                .arg("*")
                .arg("key")
                .arg(&message.key)
                .arg("payload")
                .arg(json);

            let _: String = self
                .connection_manager
                .execute_command(&cmd)
                .await
                .map_err(|e| RelayError::broker_error(format!("XADD to '{topic}' failed: {e}")))?;
        }

        debug!("Published {} messages to topic '{}'", messages.len(), topic);
        Ok(())
    }

    async fn consume(&self, topic: &str) -> RelayResult<Vec<RecordMessage>> {
        let mut cursors = self.cursors.lock().await;
        let last_id = cursors
            .entry(topic.to_string())
            .or_insert_with(|| "0-0".to_string());

        let mut cmd = redis::cmd("XRANGE");
        // "(" 前缀表示开区间，跳过已消费的最后一条
        cmd.arg(topic).arg(format!("({last_id}")).arg("+");

        let entries: Vec<(String, HashMap<String, String>)> = self
            .connection_manager
            .execute_command(&cmd)
            .await
            .map_err(|e| RelayError::broker_error(format!("XRANGE on '{topic}' failed: {e}")))?;

        let mut messages = Vec::with_capacity(entries.len());
        for (entry_id, fields) in entries {
            match fields.get("payload") {
                Some(json) => match RecordMessage::deserialize(json) {
                    Ok(message) => messages.push(message),
                    Err(e) => warn!("Skipping malformed entry {entry_id} on '{topic}': {e}"),
                },
                None => warn!("Entry {entry_id} on '{topic}' has no payload field"),
            }
            *last_id = entry_id;
        }

        Ok(messages)
    }

    async fn purge(&self, topic: &str) -> RelayResult<()> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(topic);
        let _: i64 = self
            .connection_manager
            .execute_command(&cmd)
            .await
            .map_err(|e| RelayError::broker_error(format!("DEL '{topic}' failed: {e}")))?;

        self.cursors.lock().await.remove(topic);
        Ok(())
    }
}
