//! 测试支撑crate
//!
//! 手写替身与数据构造器：替身在内存实现之上叠加调用追踪、
//! 并发重叠探测与故障注入，供各crate的集成测试复用。

pub mod builders;
pub mod mocks;

pub use builders::{chunk_payload, record, RecordBuilder};
pub use mocks::{CountingMailer, FailingMailer, FlakyMailer, TrackingRepository};
