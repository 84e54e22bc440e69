//! 批次装配crate
//!
//! 将乱序到达的分块收敛为一个完整批次：元数据与分块分别落在
//! 两个哈希键上，完成判定只看计数，收集时按索引升序拼接。

pub mod assembler;
pub mod channel;

pub use assembler::BatchAssembler;
pub use channel::{ChannelErrorReason, ChannelEvent, ChannelHandler, ChannelReply, HandledEvent};
