//! 嵌入式部署用的内建协作者
//!
//! 不依赖外部数据库和SMTP服务：仓储落在进程内哈希表上，
//! 邮件发送只写日志。用于单机运行与集成测试。

pub mod mailer;
pub mod repository;

pub use mailer::LoggingMailer;
pub use repository::MemoryRepository;
