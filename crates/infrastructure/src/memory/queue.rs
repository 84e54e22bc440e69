//! 内存派发队列
//!
//! 行为与Redis列表实现保持一致：push前检查容量上限，
//! pop为非阻塞弹出队首。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use relay_core::{DispatchItem, DispatchQueue, RelayError, RelayResult};

/// 内存派发队列
pub struct MemoryDispatchQueue {
    items: Mutex<VecDeque<DispatchItem>>,
    queue_name: String,
    max_queue_size: usize,
}

impl MemoryDispatchQueue {
    pub fn new(queue_name: impl Into<String>, max_queue_size: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            queue_name: queue_name.into(),
            max_queue_size,
        }
    }

    fn lock(&self) -> RelayResult<std::sync::MutexGuard<'_, VecDeque<DispatchItem>>> {
        self.items
            .lock()
            .map_err(|_| RelayError::store_error("memory queue lock poisoned"))
    }
}

#[async_trait]
impl DispatchQueue for MemoryDispatchQueue {
    async fn push(&self, item: &DispatchItem) -> RelayResult<()> {
        let mut items = self.lock()?;
        if items.len() >= self.max_queue_size {
            return Err(RelayError::QueueFull {
                queue: self.queue_name.clone(),
                capacity: self.max_queue_size,
            });
        }
        items.push_back(item.clone());
        Ok(())
    }

    async fn pop(&self) -> RelayResult<Option<DispatchItem>> {
        let mut items = self.lock()?;
        Ok(items.pop_front())
    }

    async fn length(&self) -> RelayResult<u64> {
        let items = self.lock()?;
        Ok(items.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_pop_fifo_order() {
        let queue = MemoryDispatchQueue::new("test_queue", 10);
        queue.push(&DispatchItem::new(1, 10)).await.unwrap();
        queue.push(&DispatchItem::new(2, 20)).await.unwrap();

        let first = queue.pop().await.unwrap().unwrap();
        assert_eq!(first.content_id, 1);
        let second = queue.pop().await.unwrap().unwrap();
        assert_eq!(second.content_id, 2);
        assert!(queue.pop().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_push_rejected_when_full() {
        let queue = MemoryDispatchQueue::new("test_queue", 2);
        queue.push(&DispatchItem::new(1, 10)).await.unwrap();
        queue.push(&DispatchItem::new(2, 20)).await.unwrap();

        let err = queue.push(&DispatchItem::new(3, 30)).await.unwrap_err();
        assert!(matches!(err, RelayError::QueueFull { capacity: 2, .. }));
        assert_eq!(queue.length().await.unwrap(), 2);
    }
}
