//! 基于Redis的存储/队列/代理实现
//!
//! 批次状态用哈希，投递队列用列表，中继主题用Stream，
//! 与键布局 `batch:{id}:metadata` / `batch:{id}:chunks` /
//! `content_email_queue` 保持一致。

pub mod broker;
pub mod connection;
pub mod queue;
pub mod store;

pub use broker::RedisStreamBroker;
pub use connection::RedisConnectionManager;
pub use queue::RedisDispatchQueue;
pub use store::RedisBatchStore;
