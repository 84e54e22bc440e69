//! 内存实现，适用于嵌入式部署与测试场景
//!
//! 与Redis实现共享同一套trait语义：哈希存储的TTL采用读时
//! 过期检查，队列与主题用进程内集合模拟。

pub mod broker;
pub mod queue;
pub mod store;

pub use broker::MemoryBroker;
pub use queue::MemoryDispatchQueue;
pub use store::MemoryBatchStore;
