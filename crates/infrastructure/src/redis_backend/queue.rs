use std::sync::Arc;

use async_trait::async_trait;
use relay_core::{DispatchItem, DispatchQueue, RelayError, RelayResult};
use tracing::debug;

use super::connection::RedisConnectionManager;

/// 基于Redis列表的持久投递队列
///
/// RPUSH入队、LPOP出队，入队前检查长度上限。
pub struct RedisDispatchQueue {
    connection_manager: Arc<RedisConnectionManager>,
    queue_name: String,
    max_queue_size: usize,
}

impl RedisDispatchQueue {
    pub fn new(
        connection_manager: Arc<RedisConnectionManager>,
        queue_name: String,
        max_queue_size: usize,
    ) -> Self {
        Self {
            connection_manager,
            queue_name,
            max_queue_size,
        }
    }
}

#[async_trait]
impl DispatchQueue for RedisDispatchQueue {
    async fn push(&self, item: &DispatchItem) -> RelayResult<()> {
        let current = self.length().await?;
        if current as usize >= self.max_queue_size {
            return Err(RelayError::QueueFull {
                queue: self.queue_name.clone(),
                capacity: self.max_queue_size,
            });
        }

        let json = item.serialize()?;
        let mut cmd = redis::cmd("RPUSH");
        cmd.arg(&self.queue_name).arg(json);
        let _: i64 = self.connection_manager.execute_command(&cmd).await?;

        debug!(
            "Pushed item ({}, {}) to queue '{}'",
            item.content_id, item.email_id, self.queue_name
        );
        Ok(())
    }

    async fn pop(&self) -> RelayResult<Option<DispatchItem>> {
        let mut cmd = redis::cmd("LPOP");
        cmd.arg(&self.queue_name);
        let raw: Option<String> = self.connection_manager.execute_command(&cmd).await?;

        match raw {
            Some(json) => Ok(Some(DispatchItem::deserialize(&json)?)),
            None => Ok(None),
        }
    }

    async fn length(&self) -> RelayResult<u64> {
        let mut cmd = redis::cmd("LLEN");
        cmd.arg(&self.queue_name);
        self.connection_manager.execute_command(&cmd).await
    }
}
