//! 派发crate
//!
//! 自终止的队列排空轮询器：受双窗口限速约束，失败进入指数
//! 退避原地重试，连续空轮询达到阈值后自行收尾并产出排空报告。

pub mod backoff;
pub mod poller;
pub mod processor;
pub mod rate_limiter;

pub use backoff::{BackoffController, BackoffStatus};
pub use poller::{DispatchPoller, PollerState, PollingStatus};
pub use processor::{EmailProcessor, ProcessOutcome};
pub use rate_limiter::{RateLimitStatus, RateLimiter};
