//! 进程内仓储实现
//!
//! 所有实体表都是哈希表，ID由单调计数器分配。与外部数据库
//! 实现一样，find-or-create不提供并发去重保证。

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_core::{DeliveryStatus, EmailContent, RelayError, RelayResult, Repository};

#[derive(Default)]
struct Inner {
    next_id: i64,
    authors_by_name: HashMap<String, i64>,
    author_names: HashMap<i64, String>,
    emails_by_address: HashMap<String, i64>,
    email_addresses: HashMap<i64, String>,
    phones_by_number: HashMap<String, i64>,
    author_emails: HashSet<(i64, i64)>,
    author_phones: HashSet<(i64, i64)>,
    contents: HashMap<i64, (i64, String)>,
    deliveries: HashMap<(i64, i64), DeliveryStatus>,
}

impl Inner {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// 进程内仓储
pub struct MemoryRepository {
    inner: Mutex<Inner>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> RelayResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| RelayError::repository_error("memory repository lock poisoned"))
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_or_create_author(
        &self,
        name: &str,
        _external_ref: Option<&str>,
    ) -> RelayResult<i64> {
        let mut inner = self.lock()?;
        if let Some(id) = inner.authors_by_name.get(name) {
            return Ok(*id);
        }
        let id = inner.allocate_id();
        inner.authors_by_name.insert(name.to_string(), id);
        inner.author_names.insert(id, name.to_string());
        Ok(id)
    }

    async fn find_or_create_email(&self, address: &str) -> RelayResult<i64> {
        let mut inner = self.lock()?;
        if let Some(id) = inner.emails_by_address.get(address) {
            return Ok(*id);
        }
        let id = inner.allocate_id();
        inner.emails_by_address.insert(address.to_string(), id);
        inner.email_addresses.insert(id, address.to_string());
        Ok(id)
    }

    async fn find_or_create_phone(&self, number: &str) -> RelayResult<i64> {
        let mut inner = self.lock()?;
        if let Some(id) = inner.phones_by_number.get(number) {
            return Ok(*id);
        }
        let id = inner.allocate_id();
        inner.phones_by_number.insert(number.to_string(), id);
        Ok(id)
    }

    async fn link_author_email(&self, author_id: i64, email_id: i64) -> RelayResult<()> {
        let mut inner = self.lock()?;
        inner.author_emails.insert((author_id, email_id));
        Ok(())
    }

    async fn link_author_phone(&self, author_id: i64, phone_id: i64) -> RelayResult<()> {
        let mut inner = self.lock()?;
        inner.author_phones.insert((author_id, phone_id));
        Ok(())
    }

    async fn create_content(&self, author_id: i64, body: &str) -> RelayResult<i64> {
        let mut inner = self.lock()?;
        let id = inner.allocate_id();
        inner.contents.insert(id, (author_id, body.to_string()));
        Ok(id)
    }

    async fn create_pending_delivery(&self, content_id: i64, email_id: i64) -> RelayResult<()> {
        let mut inner = self.lock()?;
        inner
            .deliveries
            .entry((content_id, email_id))
            .or_insert_with(|| DeliveryStatus::pending(content_id, email_id));
        Ok(())
    }

    async fn delivery_status(
        &self,
        content_id: i64,
        email_id: i64,
    ) -> RelayResult<DeliveryStatus> {
        let inner = self.lock()?;
        inner
            .deliveries
            .get(&(content_id, email_id))
            .cloned()
            .ok_or_else(|| {
                RelayError::repository_error(format!(
                    "delivery not found: content {} email {}",
                    content_id, email_id
                ))
            })
    }

    async fn email_content(&self, content_id: i64, email_id: i64) -> RelayResult<EmailContent> {
        let inner = self.lock()?;
        let (author_id, body) = inner
            .contents
            .get(&content_id)
            .cloned()
            .ok_or_else(|| {
                RelayError::repository_error(format!("content not found: {}", content_id))
            })?;
        let recipient = inner
            .email_addresses
            .get(&email_id)
            .cloned()
            .ok_or_else(|| {
                RelayError::repository_error(format!("email not found: {}", email_id))
            })?;
        Ok(EmailContent {
            content_id,
            email_id,
            body,
            recipient,
            author_name: inner.author_names.get(&author_id).cloned(),
        })
    }

    async fn mark_delivered(
        &self,
        content_id: i64,
        email_id: i64,
        sent_at: DateTime<Utc>,
    ) -> RelayResult<()> {
        let mut inner = self.lock()?;
        let status = inner
            .deliveries
            .get_mut(&(content_id, email_id))
            .ok_or_else(|| {
                RelayError::repository_error(format!(
                    "delivery not found: content {} email {}",
                    content_id, email_id
                ))
            })?;
        status.sent = true;
        status.sent_at = Some(sent_at);
        status.last_error = None;
        Ok(())
    }

    async fn record_delivery_error(
        &self,
        content_id: i64,
        email_id: i64,
        error: &str,
    ) -> RelayResult<()> {
        let mut inner = self.lock()?;
        let status = inner
            .deliveries
            .get_mut(&(content_id, email_id))
            .ok_or_else(|| {
                RelayError::repository_error(format!(
                    "delivery not found: content {} email {}",
                    content_id, email_id
                ))
            })?;
        status.last_error = Some(error.to_string());
        Ok(())
    }
}
