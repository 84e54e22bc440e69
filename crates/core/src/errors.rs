use thiserror::Error;

/// 管道错误类型定义
#[derive(Debug, Error, Clone)]
pub enum RelayError {
    #[error("存储不可用: {0}")]
    StoreUnavailable(String),

    #[error("批次未找到: {id}")]
    BatchNotFound { id: String },

    #[error("批次未完成: {id} (已收 {received}/{expected})")]
    IncompleteBatch {
        id: String,
        received: u32,
        expected: u32,
    },

    #[error("消息代理不可用: {0}")]
    BrokerUnavailable(String),

    #[error("队列已满: {queue} (上限 {capacity})")]
    QueueFull { queue: String, capacity: usize },

    #[error("仓储操作失败: {0}")]
    Repository(String),

    #[error("邮件发送失败: {message}")]
    Mailer { message: String, retryable: bool },

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    pub fn store_error<S: Into<String>>(msg: S) -> Self {
        Self::StoreUnavailable(msg.into())
    }
    pub fn batch_not_found<S: Into<String>>(id: S) -> Self {
        Self::BatchNotFound { id: id.into() }
    }
    pub fn broker_error<S: Into<String>>(msg: S) -> Self {
        Self::BrokerUnavailable(msg.into())
    }
    pub fn repository_error<S: Into<String>>(msg: S) -> Self {
        Self::Repository(msg.into())
    }
    pub fn mailer_retryable<S: Into<String>>(msg: S) -> Self {
        Self::Mailer {
            message: msg.into(),
            retryable: true,
        }
    }
    pub fn mailer_permanent<S: Into<String>>(msg: S) -> Self {
        Self::Mailer {
            message: msg.into(),
            retryable: false,
        }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 调用方误用或状态已过期，重试没有意义
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RelayError::BatchNotFound { .. }
                | RelayError::IncompleteBatch { .. }
                | RelayError::Configuration(_)
        )
    }

    /// 瞬时故障，交给退避控制器重试
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::StoreUnavailable(_)
            | RelayError::BrokerUnavailable(_)
            | RelayError::Timeout(_) => true,
            RelayError::Mailer { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for RelayError {
    fn from(err: anyhow::Error) -> Self {
        RelayError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RelayError::store_error("conn refused").is_retryable());
        assert!(RelayError::broker_error("xadd failed").is_retryable());
        assert!(RelayError::mailer_retryable("SMTP timeout").is_retryable());
        assert!(!RelayError::mailer_permanent("invalid address").is_retryable());
        assert!(!RelayError::batch_not_found("b-1").is_retryable());
        assert!(!RelayError::QueueFull {
            queue: "content_email_queue".to_string(),
            capacity: 10000,
        }
        .is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(RelayError::batch_not_found("b-1").is_fatal());
        assert!(RelayError::IncompleteBatch {
            id: "b-1".to_string(),
            received: 2,
            expected: 3,
        }
        .is_fatal());
        assert!(!RelayError::store_error("down").is_fatal());
    }

    #[test]
    fn test_serde_error_conversion() {
        let err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let relay_err: RelayError = err.into();
        assert!(matches!(relay_err, RelayError::Serialization(_)));
    }
}
