//! 协作者替身
//!
//! 仓储替身委托给内存实现，在入口处叠加调用记录、并发重叠
//! 探测与按方法名的故障注入。邮件替身覆盖常见故障形态：
//! 总是失败、先失败后成功、只计数。

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_core::{
    DeliveryStatus, EmailContent, Mailer, OutgoingEmail, RelayError, RelayResult, Repository,
};
use relay_infrastructure::MemoryRepository;

/// 带追踪与故障注入的仓储替身
pub struct TrackingRepository {
    inner: MemoryRepository,
    calls: Mutex<Vec<String>>,
    failing_methods: Mutex<HashSet<String>>,
    in_flight: AtomicUsize,
    max_overlap: AtomicUsize,
}

impl TrackingRepository {
    pub fn new() -> Self {
        Self {
            inner: MemoryRepository::new(),
            calls: Mutex::new(Vec::new()),
            failing_methods: Mutex::new(HashSet::new()),
            in_flight: AtomicUsize::new(0),
            max_overlap: AtomicUsize::new(0),
        }
    }

    /// 让指定方法开始返回错误
    pub fn fail_method(&self, method: &str) {
        self.failing_methods
            .lock()
            .unwrap()
            .insert(method.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing_methods.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == method)
            .count()
    }

    /// 观察到的最大并发调用数，串行调用方应始终为1
    pub fn max_overlap(&self) -> usize {
        self.max_overlap.load(Ordering::SeqCst)
    }

    async fn enter(&self, method: &str) -> RelayResult<OverlapGuard<'_>> {
        self.calls.lock().unwrap().push(method.to_string());
        if self.failing_methods.lock().unwrap().contains(method) {
            return Err(RelayError::repository_error(format!(
                "injected failure: {method}"
            )));
        }
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_overlap.fetch_max(current, Ordering::SeqCst);
        // 放大重叠窗口，便于捕捉并发调用
        tokio::time::sleep(Duration::from_millis(1)).await;
        Ok(OverlapGuard { owner: self })
    }
}

impl Default for TrackingRepository {
    fn default() -> Self {
        Self::new()
    }
}

struct OverlapGuard<'a> {
    owner: &'a TrackingRepository,
}

impl Drop for OverlapGuard<'_> {
    fn drop(&mut self) {
        self.owner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Repository for TrackingRepository {
    async fn find_or_create_author(
        &self,
        name: &str,
        external_ref: Option<&str>,
    ) -> RelayResult<i64> {
        let _guard = self.enter("find_or_create_author").await?;
        self.inner.find_or_create_author(name, external_ref).await
    }

    async fn find_or_create_email(&self, address: &str) -> RelayResult<i64> {
        let _guard = self.enter("find_or_create_email").await?;
        self.inner.find_or_create_email(address).await
    }

    async fn find_or_create_phone(&self, number: &str) -> RelayResult<i64> {
        let _guard = self.enter("find_or_create_phone").await?;
        self.inner.find_or_create_phone(number).await
    }

    async fn link_author_email(&self, author_id: i64, email_id: i64) -> RelayResult<()> {
        let _guard = self.enter("link_author_email").await?;
        self.inner.link_author_email(author_id, email_id).await
    }

    async fn link_author_phone(&self, author_id: i64, phone_id: i64) -> RelayResult<()> {
        let _guard = self.enter("link_author_phone").await?;
        self.inner.link_author_phone(author_id, phone_id).await
    }

    async fn create_content(&self, author_id: i64, body: &str) -> RelayResult<i64> {
        let _guard = self.enter("create_content").await?;
        self.inner.create_content(author_id, body).await
    }

    async fn create_pending_delivery(&self, content_id: i64, email_id: i64) -> RelayResult<()> {
        let _guard = self.enter("create_pending_delivery").await?;
        self.inner.create_pending_delivery(content_id, email_id).await
    }

    async fn delivery_status(
        &self,
        content_id: i64,
        email_id: i64,
    ) -> RelayResult<DeliveryStatus> {
        let _guard = self.enter("delivery_status").await?;
        self.inner.delivery_status(content_id, email_id).await
    }

    async fn email_content(&self, content_id: i64, email_id: i64) -> RelayResult<EmailContent> {
        let _guard = self.enter("email_content").await?;
        self.inner.email_content(content_id, email_id).await
    }

    async fn mark_delivered(
        &self,
        content_id: i64,
        email_id: i64,
        sent_at: DateTime<Utc>,
    ) -> RelayResult<()> {
        let _guard = self.enter("mark_delivered").await?;
        self.inner.mark_delivered(content_id, email_id, sent_at).await
    }

    async fn record_delivery_error(
        &self,
        content_id: i64,
        email_id: i64,
        error: &str,
    ) -> RelayResult<()> {
        let _guard = self.enter("record_delivery_error").await?;
        self.inner
            .record_delivery_error(content_id, email_id, error)
            .await
    }
}

/// 总是失败的邮件替身
pub struct FailingMailer {
    message: String,
    attempts: AtomicUsize,
}

impl FailingMailer {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _email: &OutgoingEmail) -> RelayResult<DateTime<Utc>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(RelayError::mailer_retryable(self.message.clone()))
    }
}

/// 先失败N次再成功的邮件替身
pub struct FlakyMailer {
    failures_remaining: AtomicUsize,
    attempts: AtomicUsize,
    message: String,
}

impl FlakyMailer {
    pub fn new(failures: usize, message: impl Into<String>) -> Self {
        Self {
            failures_remaining: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
            message: message.into(),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Mailer for FlakyMailer {
    async fn send(&self, _email: &OutgoingEmail) -> RelayResult<DateTime<Utc>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(RelayError::mailer_retryable(self.message.clone()));
        }
        Ok(Utc::now())
    }
}

/// 只计数的邮件替身，记录每封邮件的收件人与主题
pub struct CountingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl CountingMailer {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Default for CountingMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mailer for CountingMailer {
    async fn send(&self, email: &OutgoingEmail) -> RelayResult<DateTime<Utc>> {
        self.sent
            .lock()
            .unwrap()
            .push((email.recipient.clone(), email.subject.clone()));
        Ok(Utc::now())
    }
}
