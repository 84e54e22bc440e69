use async_trait::async_trait;

use crate::errors::RelayResult;
use crate::models::DispatchItem;

/// 持久FIFO投递队列抽象
///
/// pop没有两阶段确认：一旦弹出即从队列移除，消费方在处理
/// 中途崩溃会丢失该项（接受的已知限制）。
#[async_trait]
pub trait DispatchQueue: Send + Sync {
    /// 追加到队尾，达到容量上限时返回QueueFull
    async fn push(&self, item: &DispatchItem) -> RelayResult<()>;

    /// 弹出队首，队列为空时返回None，从不阻塞
    async fn pop(&self) -> RelayResult<Option<DispatchItem>>;

    /// 当前队列深度
    async fn length(&self) -> RelayResult<u64>;
}
