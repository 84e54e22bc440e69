use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::RelayResult;
use crate::models::OutgoingEmail;

/// 出站邮件传输抽象（外部协作者，仅定义接口）
#[async_trait]
pub trait Mailer: Send + Sync {
    /// 发送成功返回发出时刻；失败用 RelayError::Mailer 区分可否重试
    async fn send(&self, email: &OutgoingEmail) -> RelayResult<DateTime<Utc>>;
}
