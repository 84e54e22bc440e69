//! 中继桥crate
//!
//! 批次收集到的记录先整批发布到消息代理，再由消费侧逐条
//! 串行解析落库，并为每个 (content, email) 组合建立待投递项。
//! 发布与消费在同一进程内并发运行，由编排器对齐两端进度。

pub mod consumer;
pub mod orchestrator;
pub mod publisher;

pub use consumer::{ConsumeReport, RecordConsumer};
pub use orchestrator::BridgeOrchestrator;
pub use publisher::RecordPublisher;
