//! 派发轮询器
//!
//! 自终止的队列排空循环：每次取项前先过限速闸门；取到项后
//! 交给处理器，可重试失败在退避下原地重试，重试预算耗尽则
//! 整次排空以错误收场；连续空轮询达到阈值视为队列已排空，
//! 正常收尾。外部随时可通过stop()请求停止。

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_core::config::{PollerConfig, RetryPolicyConfig};
use relay_core::{DispatchItem, DispatchQueue, DrainOutcome, DrainReport, RelayResult};
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffController;
use crate::processor::{EmailProcessor, ProcessOutcome};
use crate::rate_limiter::{RateLimitStatus, RateLimiter};

/// 轮询器所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
    Processing,
    WaitingEmpty,
    WaitingBackoff,
    Stopped,
}

impl PollerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PollerState::Polling,
            2 => PollerState::Processing,
            3 => PollerState::WaitingEmpty,
            4 => PollerState::WaitingBackoff,
            5 => PollerState::Stopped,
            _ => PollerState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            PollerState::Idle => 0,
            PollerState::Polling => 1,
            PollerState::Processing => 2,
            PollerState::WaitingEmpty => 3,
            PollerState::WaitingBackoff => 4,
            PollerState::Stopped => 5,
        }
    }
}

/// 运行状态快照
#[derive(Debug, Clone)]
pub struct PollingStatus {
    pub state: PollerState,
    pub processed_count: u64,
    pub consecutive_empty_polls: u32,
    pub rate: RateLimitStatus,
}

/// 派发轮询器
pub struct DispatchPoller {
    queue: Arc<dyn DispatchQueue>,
    processor: Arc<EmailProcessor>,
    rate_limiter: Arc<RateLimiter>,
    retry_policy: RetryPolicyConfig,
    config: PollerConfig,
    stop_requested: AtomicBool,
    state: AtomicU8,
    processed: AtomicU64,
    consecutive_empty: AtomicU32,
}

impl DispatchPoller {
    pub fn new(
        queue: Arc<dyn DispatchQueue>,
        processor: Arc<EmailProcessor>,
        rate_limiter: Arc<RateLimiter>,
        retry_policy: RetryPolicyConfig,
        config: PollerConfig,
    ) -> Self {
        Self {
            queue,
            processor,
            rate_limiter,
            retry_policy,
            config,
            stop_requested: AtomicBool::new(false),
            state: AtomicU8::new(PollerState::Idle.as_u8()),
            processed: AtomicU64::new(0),
            consecutive_empty: AtomicU32::new(0),
        }
    }

    fn enter_state(&self, state: PollerState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// 请求停止，run会在当前项处理完后收尾
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        info!("轮询器收到停止请求");
    }

    pub fn status(&self) -> RelayResult<PollingStatus> {
        Ok(PollingStatus {
            state: PollerState::from_u8(self.state.load(Ordering::SeqCst)),
            processed_count: self.processed.load(Ordering::SeqCst),
            consecutive_empty_polls: self.consecutive_empty.load(Ordering::SeqCst),
            rate: self.rate_limiter.status()?,
        })
    }

    /// 排空队列直到自然完成、出错或被叫停，返回完成记录
    pub async fn run(&self) -> RelayResult<DrainReport> {
        let started_at = chrono::Utc::now();
        self.processed.store(0, Ordering::SeqCst);
        self.consecutive_empty.store(0, Ordering::SeqCst);
        info!(queue = %self.config.queue_name, "开始排空派发队列");

        let (outcome, message, last_error) = self.drain_loop().await;

        self.enter_state(PollerState::Stopped);
        let report = DrainReport::new(
            outcome,
            message,
            self.processed.load(Ordering::SeqCst),
            started_at,
            last_error,
        );
        info!(
            status = ?report.status,
            processed = report.processed_count,
            duration_ms = report.duration_ms,
            "排空结束"
        );
        Ok(report)
    }

    async fn drain_loop(&self) -> (DrainOutcome, String, Option<String>) {
        // 轮询本身的瞬时故障（限速器、队列弹出）共用一份退避预算，
        // 成功取到一次结果即重置
        let mut poll_backoff = BackoffController::new(self.retry_policy.clone());
        loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                return (DrainOutcome::Stopped, "外部请求停止".to_string(), None);
            }

            self.enter_state(PollerState::Polling);
            // 限速闸门在取项之前，队首项不会在等待中被占走
            let polled = match self.rate_limiter.wait_until_allowed().await {
                Ok(()) => self.queue.pop().await,
                Err(e) => Err(e),
            };
            let item = match polled {
                Ok(item) => {
                    poll_backoff.reset();
                    item
                }
                Err(e) if e.is_retryable() && poll_backoff.should_retry() => {
                    let status = poll_backoff.status();
                    warn!(
                        attempt = status.attempts + 1,
                        max_retries = status.max_retries,
                        error = %e,
                        "轮询失败，进入退避后重试"
                    );
                    self.enter_state(PollerState::WaitingBackoff);
                    poll_backoff.wait().await;
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "轮询失败且无法重试");
                    return (
                        DrainOutcome::Error,
                        "队列不可用".to_string(),
                        Some(e.to_string()),
                    );
                }
            };

            match item {
                None => {
                    let empty = self.consecutive_empty.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!(empty, threshold = self.config.empty_poll_threshold, "空轮询");
                    if empty >= self.config.empty_poll_threshold {
                        return (
                            DrainOutcome::Completed,
                            "队列已排空".to_string(),
                            None,
                        );
                    }
                    self.enter_state(PollerState::WaitingEmpty);
                    tokio::time::sleep(Duration::from_millis(self.config.empty_queue_backoff_ms))
                        .await;
                }
                Some(item) => {
                    self.consecutive_empty.store(0, Ordering::SeqCst);
                    self.enter_state(PollerState::Processing);
                    if let Some(failure) = self.process_with_retry(&item).await {
                        return (DrainOutcome::Error, "重试预算耗尽".to_string(), Some(failure));
                    }
                }
            }
        }
    }

    /// 单项处理，可重试失败在退避下原地重试
    ///
    /// 返回None表示该项已了结（发送、短路或永久失败丢弃），
    /// 返回Some(错误)表示重试耗尽，整次排空应终止。
    async fn process_with_retry(&self, item: &DispatchItem) -> Option<String> {
        let mut backoff = BackoffController::new(self.retry_policy.clone());
        loop {
            match self.processor.process(item).await {
                ProcessOutcome::Sent | ProcessOutcome::AlreadySent => {
                    self.processed.fetch_add(1, Ordering::SeqCst);
                    return None;
                }
                ProcessOutcome::Failed { retryable: false, error } => {
                    // 永久失败不占重试预算，丢弃该项继续排空
                    warn!(
                        content_id = item.content_id,
                        email_id = item.email_id,
                        error = %error,
                        "永久失败，投递项丢弃"
                    );
                    return None;
                }
                ProcessOutcome::Failed { retryable: true, error } => {
                    if !backoff.should_retry() {
                        error!(
                            content_id = item.content_id,
                            email_id = item.email_id,
                            error = %error,
                            "重试预算耗尽"
                        );
                        return Some(error);
                    }
                    let status = backoff.status();
                    warn!(
                        content_id = item.content_id,
                        email_id = item.email_id,
                        attempt = status.attempts + 1,
                        max_retries = status.max_retries,
                        error = %error,
                        "可重试失败，进入退避"
                    );
                    // 退避期间收到停止请求也让在手项走完重试，
                    // 停止在下一次取项前生效
                    self.enter_state(PollerState::WaitingBackoff);
                    backoff.wait().await;
                    self.enter_state(PollerState::Processing);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::config::{MailerConfig, RateLimitConfig};
    use relay_core::Repository;
    use relay_infrastructure::{LoggingMailer, MemoryDispatchQueue, MemoryRepository};

    fn fast_poller_config() -> PollerConfig {
        PollerConfig {
            queue_name: "test_queue".to_string(),
            max_queue_size: 100,
            empty_queue_backoff_ms: 5,
            empty_poll_threshold: 3,
        }
    }

    fn fast_retry_policy() -> RetryPolicyConfig {
        RetryPolicyConfig {
            initial_delay_ms: 2,
            max_delay_ms: 8,
            backoff_multiplier: 2.0,
            max_retries: 3,
        }
    }

    async fn seeded_queue(
        repository: &MemoryRepository,
        queue: &MemoryDispatchQueue,
        count: usize,
    ) {
        for i in 0..count {
            let author_id = repository
                .find_or_create_author(&format!("author-{i}"), None)
                .await
                .unwrap();
            let email_id = repository
                .find_or_create_email(&format!("a{i}@example.com"))
                .await
                .unwrap();
            let content_id = repository
                .create_content(author_id, "<p>hi</p>")
                .await
                .unwrap();
            repository
                .create_pending_delivery(content_id, email_id)
                .await
                .unwrap();
            queue
                .push(&DispatchItem::new(content_id, email_id))
                .await
                .unwrap();
        }
    }

    fn poller(
        repository: Arc<MemoryRepository>,
        queue: Arc<MemoryDispatchQueue>,
    ) -> DispatchPoller {
        let rate_limiter = Arc::new(RateLimiter::new(&RateLimitConfig {
            max_per_minute: 1000,
            max_per_hour: 10_000,
        }));
        let processor = Arc::new(EmailProcessor::new(
            repository,
            Arc::new(LoggingMailer::new()),
            rate_limiter.clone(),
            MailerConfig::default(),
        ));
        DispatchPoller::new(
            queue,
            processor,
            rate_limiter,
            fast_retry_policy(),
            fast_poller_config(),
        )
    }

    #[tokio::test]
    async fn test_drains_queue_and_terminates() {
        let repository = Arc::new(MemoryRepository::new());
        let queue = Arc::new(MemoryDispatchQueue::new("test_queue", 100));
        seeded_queue(&repository, &queue, 4).await;

        let poller = poller(repository, queue.clone());
        let report = poller.run().await.unwrap();

        assert_eq!(report.status, DrainOutcome::Completed);
        assert_eq!(report.processed_count, 4);
        assert_eq!(queue.length().await.unwrap(), 0);

        let status = poller.status().unwrap();
        assert_eq!(status.state, PollerState::Stopped);
        assert_eq!(status.processed_count, 4);
    }

    #[tokio::test]
    async fn test_empty_queue_terminates_after_threshold() {
        let repository = Arc::new(MemoryRepository::new());
        let queue = Arc::new(MemoryDispatchQueue::new("test_queue", 100));

        let poller = poller(repository, queue);
        let report = poller.run().await.unwrap();

        assert_eq!(report.status, DrainOutcome::Completed);
        assert_eq!(report.processed_count, 0);
    }

    #[tokio::test]
    async fn test_new_item_resets_empty_poll_counter() {
        let repository = Arc::new(MemoryRepository::new());
        let queue = Arc::new(MemoryDispatchQueue::new("test_queue", 100));

        let rate_limiter = Arc::new(RateLimiter::new(&RateLimitConfig {
            max_per_minute: 1000,
            max_per_hour: 10_000,
        }));
        let processor = Arc::new(EmailProcessor::new(
            Arc::clone(&repository) as Arc<dyn Repository>,
            Arc::new(LoggingMailer::new()),
            rate_limiter.clone(),
            MailerConfig::default(),
        ));
        let poller = Arc::new(DispatchPoller::new(
            queue.clone(),
            processor,
            rate_limiter,
            fast_retry_policy(),
            PollerConfig {
                empty_queue_backoff_ms: 20,
                empty_poll_threshold: 5,
                ..fast_poller_config()
            },
        ));

        let runner = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.run().await })
        };

        // 先让轮询器累计一两次空轮询，再补入新项
        tokio::time::sleep(Duration::from_millis(30)).await;
        seeded_queue(&repository, &queue, 1).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        // 新项被处理，空轮询计数从头计起
        let status = poller.status().unwrap();
        assert_eq!(status.processed_count, 1);
        assert!(status.consecutive_empty_polls < 5);

        let report = runner.await.unwrap().unwrap();
        assert_eq!(report.status, DrainOutcome::Completed);
        assert_eq!(report.processed_count, 1);
    }

    #[tokio::test]
    async fn test_stop_interrupts_drain() {
        let repository = Arc::new(MemoryRepository::new());
        let queue = Arc::new(MemoryDispatchQueue::new("test_queue", 100));

        let poller = Arc::new(DispatchPoller::new(
            queue,
            Arc::new(EmailProcessor::new(
                repository,
                Arc::new(LoggingMailer::new()),
                Arc::new(RateLimiter::new(&RateLimitConfig::default())),
                MailerConfig::default(),
            )),
            Arc::new(RateLimiter::new(&RateLimitConfig::default())),
            fast_retry_policy(),
            PollerConfig {
                // 长空轮询间隔，stop必须能打断排空
                empty_queue_backoff_ms: 20,
                empty_poll_threshold: 1000,
                ..fast_poller_config()
            },
        ));

        let runner = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.run().await })
        };
        tokio::time::sleep(Duration::from_millis(60)).await;
        poller.stop();

        let report = runner.await.unwrap().unwrap();
        assert_eq!(report.status, DrainOutcome::Stopped);
    }

    #[tokio::test]
    async fn test_permanent_failure_drops_item_and_continues() {
        let repository = Arc::new(MemoryRepository::new());
        let queue = Arc::new(MemoryDispatchQueue::new("test_queue", 100));
        // 队首项没有对应状态行，处理器会判为永久失败
        queue.push(&DispatchItem::new(999, 998)).await.unwrap();
        seeded_queue(&repository, &queue, 2).await;

        let poller = poller(repository, queue);
        let report = poller.run().await.unwrap();

        assert_eq!(report.status, DrainOutcome::Completed);
        assert_eq!(report.processed_count, 2);
    }
}
