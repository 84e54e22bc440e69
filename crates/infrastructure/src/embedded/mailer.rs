//! 日志邮件发送器
//!
//! 不触达任何SMTP服务，仅记录日志后返回当前时间作为发送时刻。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_core::{Mailer, OutgoingEmail, RelayResult};
use tracing::info;

/// 日志邮件发送器
pub struct LoggingMailer;

impl LoggingMailer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoggingMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mailer for LoggingMailer {
    async fn send(&self, email: &OutgoingEmail) -> RelayResult<DateTime<Utc>> {
        info!(
            recipient = %email.recipient,
            subject = %email.subject,
            attachments = email.attachments.len(),
            "email dispatched (logging mailer)"
        );
        Ok(Utc::now())
    }
}
