use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::RelayResult;
use crate::models::{DeliveryStatus, EmailContent};

/// 业务实体的关系持久化抽象（外部协作者，仅定义接口）
///
/// find-or-create 系列操作不是并发安全的：两个并发调用者可能
/// 为同一键各建一行。中继桥消费侧因此严格串行调用。
#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_or_create_author(
        &self,
        name: &str,
        external_ref: Option<&str>,
    ) -> RelayResult<i64>;

    async fn find_or_create_email(&self, address: &str) -> RelayResult<i64>;

    async fn find_or_create_phone(&self, number: &str) -> RelayResult<i64>;

    async fn link_author_email(&self, author_id: i64, email_id: i64) -> RelayResult<()>;

    async fn link_author_phone(&self, author_id: i64, phone_id: i64) -> RelayResult<()>;

    async fn create_content(&self, author_id: i64, body: &str) -> RelayResult<i64>;

    /// 建立 (content, email) 待投递行，sent=false
    async fn create_pending_delivery(&self, content_id: i64, email_id: i64) -> RelayResult<()>;

    async fn delivery_status(&self, content_id: i64, email_id: i64)
        -> RelayResult<DeliveryStatus>;

    /// 装配邮件正文、收件地址与作者名
    async fn email_content(&self, content_id: i64, email_id: i64) -> RelayResult<EmailContent>;

    async fn mark_delivered(
        &self,
        content_id: i64,
        email_id: i64,
        sent_at: DateTime<Utc>,
    ) -> RelayResult<()>;

    /// 记录最近一次失败原因，不改变sent标志
    async fn record_delivery_error(
        &self,
        content_id: i64,
        email_id: i64,
        error: &str,
    ) -> RelayResult<()>;
}
