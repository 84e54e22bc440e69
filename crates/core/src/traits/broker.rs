use async_trait::async_trait;

use crate::errors::RelayResult;
use crate::models::RecordMessage;

/// 发布/订阅代理抽象，连接中继桥的两半
///
/// 发布方一次性追加整批消息；消费方从最早保留位点开始读取，
/// 代理内部维护每个主题的消费游标。
#[async_trait]
pub trait RelayBroker: Send + Sync {
    /// 将一批消息按序追加到主题，任一条失败即整体失败
    async fn publish_batch(&self, topic: &str, messages: &[RecordMessage]) -> RelayResult<()>;

    /// 取出游标之后当前可见的消息并前移游标，非阻塞
    async fn consume(&self, topic: &str) -> RelayResult<Vec<RecordMessage>>;

    /// 清空主题并重置游标
    async fn purge(&self, topic: &str) -> RelayResult<()>;
}
