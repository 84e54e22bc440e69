//! 单封邮件处理器
//!
//! 先查投递状态做幂等短路，再装配内容、套用主题模板并发送。
//! 发送成功计入限速窗口并落库发送时刻；失败按错误文本分类，
//! 记录最近错误，由调用方决定是否重试。

use std::sync::Arc;

use relay_core::config::MailerConfig;
use relay_core::{DeliveryErrorKind, DispatchItem, Mailer, OutgoingEmail, Repository};
use tracing::{error, info, warn};

use crate::rate_limiter::RateLimiter;

/// 单次处理的结果
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// 本次发送成功
    Sent,
    /// 状态行已标记发送，幂等短路
    AlreadySent,
    /// 失败，retryable决定是否进入退避重试
    Failed { retryable: bool, error: String },
}

/// 单封邮件处理器
pub struct EmailProcessor {
    repository: Arc<dyn Repository>,
    mailer: Arc<dyn Mailer>,
    rate_limiter: Arc<RateLimiter>,
    config: MailerConfig,
}

impl EmailProcessor {
    pub fn new(
        repository: Arc<dyn Repository>,
        mailer: Arc<dyn Mailer>,
        rate_limiter: Arc<RateLimiter>,
        config: MailerConfig,
    ) -> Self {
        Self {
            repository,
            mailer,
            rate_limiter,
            config,
        }
    }

    fn subject_for(&self, author_name: Option<&str>) -> String {
        self.config
            .subject_template
            .replace("{author}", author_name.unwrap_or("there"))
    }

    fn failed(&self, error: impl ToString) -> ProcessOutcome {
        let error = error.to_string();
        let kind = DeliveryErrorKind::classify(&error);
        ProcessOutcome::Failed {
            retryable: kind.is_retryable(),
            error,
        }
    }

    /// 处理一个投递项
    pub async fn process(&self, item: &DispatchItem) -> ProcessOutcome {
        let status = match self
            .repository
            .delivery_status(item.content_id, item.email_id)
            .await
        {
            Ok(status) => status,
            Err(e) => return self.failed(e),
        };
        if status.sent {
            info!(
                content_id = item.content_id,
                email_id = item.email_id,
                "投递项已发送，跳过"
            );
            return ProcessOutcome::AlreadySent;
        }

        let content = match self
            .repository
            .email_content(item.content_id, item.email_id)
            .await
        {
            Ok(content) => content,
            Err(e) => return self.failed(e),
        };

        let email = OutgoingEmail {
            recipient: content.recipient.clone(),
            subject: self.subject_for(content.author_name.as_deref()),
            html_body: content.body,
            attachments: self.config.attachments.clone(),
        };

        match self.mailer.send(&email).await {
            Ok(sent_at) => {
                if let Err(e) = self.rate_limiter.record_sent() {
                    warn!(error = %e, "限速计数失败");
                }
                // 邮件已出站，状态落库失败只记日志，避免重试造成重复发送
                if let Err(e) = self
                    .repository
                    .mark_delivered(item.content_id, item.email_id, sent_at)
                    .await
                {
                    error!(
                        content_id = item.content_id,
                        email_id = item.email_id,
                        error = %e,
                        "发送成功但状态落库失败"
                    );
                }
                info!(
                    content_id = item.content_id,
                    email_id = item.email_id,
                    recipient = %content.recipient,
                    "邮件已发送"
                );
                ProcessOutcome::Sent
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(record_err) = self
                    .repository
                    .record_delivery_error(item.content_id, item.email_id, &message)
                    .await
                {
                    warn!(error = %record_err, "投递错误落库失败");
                }
                warn!(
                    content_id = item.content_id,
                    email_id = item.email_id,
                    error = %message,
                    "邮件发送失败"
                );
                self.failed(message)
            }
        }
    }
}
