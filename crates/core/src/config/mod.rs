pub mod models;

pub use models::{
    BatchConfig, BrokerConfig, MailerConfig, PollerConfig, RateLimitConfig, RedisConfig,
    RetryPolicyConfig,
};

use serde::{Deserialize, Serialize};

use crate::errors::{RelayError, RelayResult};

/// 应用总配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub redis: RedisConfig,
    pub batch: BatchConfig,
    pub broker: BrokerConfig,
    pub rate_limits: RateLimitConfig,
    pub retry_policy: RetryPolicyConfig,
    pub poller: PollerConfig,
    pub mailer: MailerConfig,
}

impl AppConfig {
    /// 从TOML文件加载配置，再用 RELAY__ 前缀的环境变量覆盖。
    /// 文件不存在时使用默认值。
    pub fn load(config_path: Option<&str>) -> RelayResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("RELAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| RelayError::Configuration(format!("加载配置失败: {e}")))?;

        let app_config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| RelayError::Configuration(format!("解析配置失败: {e}")))?;

        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> RelayResult<()> {
        if self.rate_limits.max_per_minute == 0 || self.rate_limits.max_per_hour == 0 {
            return Err(RelayError::config_error("限速上限必须大于0"));
        }
        if self.rate_limits.max_per_minute > self.rate_limits.max_per_hour {
            return Err(RelayError::config_error("每分钟上限不能超过每小时上限"));
        }
        if self.retry_policy.backoff_multiplier < 1.0 {
            return Err(RelayError::config_error("退避倍数不能小于1.0"));
        }
        if self.retry_policy.initial_delay_ms > self.retry_policy.max_delay_ms {
            return Err(RelayError::config_error("初始退避不能超过最大退避"));
        }
        if self.poller.max_queue_size == 0 {
            return Err(RelayError::config_error("队列容量必须大于0"));
        }
        if self.poller.empty_poll_threshold == 0 {
            return Err(RelayError::config_error("空轮询终止阈值必须大于0"));
        }
        if self.batch.ttl_seconds == 0 {
            return Err(RelayError::config_error("批次TTL必须大于0"));
        }
        Ok(())
    }
}
