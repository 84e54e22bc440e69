use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 每个 (content, email) 对的持久投递状态，重发前的幂等依据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStatus {
    pub content_id: i64,
    pub email_id: i64,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl DeliveryStatus {
    pub fn pending(content_id: i64, email_id: i64) -> Self {
        Self {
            content_id,
            email_id,
            sent: false,
            sent_at: None,
            last_error: None,
        }
    }
}

/// 从仓储装配出来的待发邮件内容
#[derive(Debug, Clone)]
pub struct EmailContent {
    pub content_id: i64,
    pub email_id: i64,
    pub body: String,
    pub recipient: String,
    pub author_name: Option<String>,
}

/// 交给Mailer的出站邮件
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub recipient: String,
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<String>,
}

/// 投递失败的分类，决定是否进入退避重试
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryErrorKind {
    Smtp,
    RateLimitExceeded,
    InvalidAddress,
    ContentNotFound,
    Store,
    Queue,
}

impl DeliveryErrorKind {
    /// 按错误文本归类，未知错误按存储错误处理
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("smtp") || lower.contains("timeout") || lower.contains("connection") {
            DeliveryErrorKind::Smtp
        } else if lower.contains("rate limit") || lower.contains("throttle") {
            DeliveryErrorKind::RateLimitExceeded
        } else if lower.contains("invalid") || lower.contains("address") {
            DeliveryErrorKind::InvalidAddress
        } else if lower.contains("not found") || lower.contains("content") {
            DeliveryErrorKind::ContentNotFound
        } else if lower.contains("queue") {
            DeliveryErrorKind::Queue
        } else {
            DeliveryErrorKind::Store
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeliveryErrorKind::Smtp
                | DeliveryErrorKind::RateLimitExceeded
                | DeliveryErrorKind::Queue
                | DeliveryErrorKind::Store
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_retryable() {
        assert_eq!(
            DeliveryErrorKind::classify("SMTP connection refused"),
            DeliveryErrorKind::Smtp
        );
        assert!(DeliveryErrorKind::classify("rate limit exceeded").is_retryable());
        assert!(DeliveryErrorKind::classify("request timeout").is_retryable());
    }

    #[test]
    fn test_classify_permanent() {
        assert_eq!(
            DeliveryErrorKind::classify("invalid address"),
            DeliveryErrorKind::InvalidAddress
        );
        assert!(!DeliveryErrorKind::classify("invalid address").is_retryable());
        assert!(!DeliveryErrorKind::classify("content not found").is_retryable());
    }
}
