pub mod embedded;
pub mod memory;
pub mod redis_backend;

pub use embedded::{LoggingMailer, MemoryRepository};
pub use memory::{MemoryBatchStore, MemoryBroker, MemoryDispatchQueue};
pub use redis_backend::{
    RedisBatchStore, RedisConnectionManager, RedisDispatchQueue, RedisStreamBroker,
};
