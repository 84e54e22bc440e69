use serde::{Deserialize, Serialize};

/// Redis连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub database: i64,
    pub password: Option<String>,
    pub max_retry_attempts: u32,
    pub retry_delay_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            password: None,
            max_retry_attempts: 3,
            retry_delay_seconds: 1,
        }
    }
}

impl RedisConfig {
    /// 构建Redis连接URL
    pub fn build_connection_url(&self) -> String {
        if let Some(password) = &self.password {
            format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            )
        } else {
            format!("redis://{}:{}/{}", self.host, self.port, self.database)
        }
    }
}

/// 批次装配配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub key_prefix: String,
    /// 批次键的存活时间（秒），过期即可回收
    pub ttl_seconds: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            key_prefix: "batch:".to_string(),
            ttl_seconds: 24 * 60 * 60,
        }
    }
}

/// 滑动窗口限速配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_per_minute: u32,
    pub max_per_hour: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_minute: 28,
            max_per_hour: 1000,
        }
    }
}

/// 指数退避重试策略
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_retries: u32,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            max_retries: 3,
        }
    }
}

/// 轮询器与投递队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub queue_name: String,
    pub max_queue_size: usize,
    /// 空轮询后的等待间隔（毫秒）
    pub empty_queue_backoff_ms: u64,
    /// 连续空轮询多少次后自行终止
    pub empty_poll_threshold: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            queue_name: "content_email_queue".to_string(),
            max_queue_size: 10_000,
            empty_queue_backoff_ms: 10_000,
            empty_poll_threshold: 3,
        }
    }
}

/// 邮件装配配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailerConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_secure: bool,
    pub smtp_user: String,
    pub smtp_password: String,
    /// 主题模板，`{author}` 占位符替换为作者名
    pub subject_template: String,
    pub attachments: Vec<String>,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: 587,
            smtp_secure: false,
            smtp_user: String::new(),
            smtp_password: String::new(),
            subject_template: "Full Stack Developer Engineer | {author}".to_string(),
            attachments: Vec::new(),
        }
    }
}

/// 中继主题配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub topic: String,
    /// 消费侧空转时的轮询间隔（毫秒）
    pub consume_interval_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            topic: "email-chunks".to_string(),
            consume_interval_ms: 100,
        }
    }
}
