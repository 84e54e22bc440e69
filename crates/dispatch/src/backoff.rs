//! 指数退避控制器
//!
//! 延迟从初始值按倍率增长并封顶，每次等待附加随机抖动，
//! 避免多个重试节奏对齐。成功一次即整体复位。

use std::time::Duration;

use rand::Rng;
use relay_core::config::RetryPolicyConfig;
use tracing::debug;

/// 退避状态快照
#[derive(Debug, Clone)]
pub struct BackoffStatus {
    pub attempts: u32,
    pub max_retries: u32,
    pub next_delay_ms: u64,
}

/// 指数退避控制器
pub struct BackoffController {
    config: RetryPolicyConfig,
    attempts: u32,
    current_delay_ms: u64,
}

impl BackoffController {
    pub fn new(config: RetryPolicyConfig) -> Self {
        let current_delay_ms = config.initial_delay_ms;
        Self {
            config,
            attempts: 0,
            current_delay_ms,
        }
    }

    /// 还有重试预算
    pub fn should_retry(&self) -> bool {
        self.attempts < self.config.max_retries
    }

    /// 等待当前延迟加抖动，然后推进到下一档
    ///
    /// 抖动上限取初始延迟与1秒的较小值。
    pub async fn wait(&mut self) {
        let delay = self.current_delay_ms.min(self.config.max_delay_ms);
        let jitter_cap = self.config.initial_delay_ms.min(1000).max(1);
        let jitter = rand::rng().random_range(0..jitter_cap);
        debug!(
            attempt = self.attempts + 1,
            delay_ms = delay,
            jitter_ms = jitter,
            "退避等待"
        );
        tokio::time::sleep(Duration::from_millis(delay + jitter)).await;

        self.attempts += 1;
        self.current_delay_ms = ((self.current_delay_ms as f64 * self.config.backoff_multiplier)
            as u64)
            .min(self.config.max_delay_ms);
    }

    /// 成功后复位延迟与计数
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current_delay_ms = self.config.initial_delay_ms;
    }

    pub fn status(&self) -> BackoffStatus {
        BackoffStatus {
            attempts: self.attempts,
            max_retries: self.config.max_retries,
            next_delay_ms: self.current_delay_ms.min(self.config.max_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy() -> RetryPolicyConfig {
        RetryPolicyConfig {
            initial_delay_ms: 4,
            max_delay_ms: 16,
            backoff_multiplier: 2.0,
            max_retries: 3,
        }
    }

    #[tokio::test]
    async fn test_delay_grows_and_caps() {
        let mut backoff = BackoffController::new(fast_policy());
        assert_eq!(backoff.status().next_delay_ms, 4);

        backoff.wait().await;
        assert_eq!(backoff.status().next_delay_ms, 8);
        backoff.wait().await;
        assert_eq!(backoff.status().next_delay_ms, 16);
        backoff.wait().await;
        // 封顶后不再增长
        assert_eq!(backoff.status().next_delay_ms, 16);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausts() {
        let mut backoff = BackoffController::new(fast_policy());
        for _ in 0..3 {
            assert!(backoff.should_retry());
            backoff.wait().await;
        }
        assert!(!backoff.should_retry());
    }

    #[tokio::test]
    async fn test_reset_restores_initial_state() {
        let mut backoff = BackoffController::new(fast_policy());
        backoff.wait().await;
        backoff.wait().await;

        backoff.reset();
        assert!(backoff.should_retry());
        assert_eq!(backoff.status().attempts, 0);
        assert_eq!(backoff.status().next_delay_ms, 4);
    }
}
