//! 双窗口发送限速器
//!
//! 分钟窗与小时窗各自维护计数与窗口起点，过期判定放在读取
//! 时：任何一次检查发现窗口已过期就清零重开。等待时长取被
//! 触发窗口的剩余时间，并按窗口长度等比夹取，避免空转也避免
//! 一次睡过头。

use std::sync::Mutex;
use std::time::{Duration, Instant};

use relay_core::config::RateLimitConfig;
use relay_core::{RelayError, RelayResult};
use tracing::debug;

struct Window {
    count: u32,
    limit: u32,
    length: Duration,
    started_at: Instant,
}

impl Window {
    fn new(limit: u32, length: Duration) -> Self {
        Self {
            count: 0,
            limit,
            length,
            started_at: Instant::now(),
        }
    }

    /// 读取前先做过期检查
    fn refresh(&mut self, now: Instant) {
        if now.duration_since(self.started_at) >= self.length {
            self.count = 0;
            self.started_at = now;
        }
    }

    fn has_capacity(&self) -> bool {
        self.count < self.limit
    }

    fn remaining(&self, now: Instant) -> Duration {
        self.length
            .saturating_sub(now.duration_since(self.started_at))
    }
}

/// 限速器当前状态快照
#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    pub minute_count: u32,
    pub minute_limit: u32,
    pub hour_count: u32,
    pub hour_limit: u32,
}

/// 双窗口发送限速器
pub struct RateLimiter {
    windows: Mutex<(Window, Window)>,
    minute_length: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_windows(
            config,
            Duration::from_secs(60),
            Duration::from_secs(60 * 60),
        )
    }

    /// 自定义窗口长度的构造，窗口语义不变
    pub fn with_windows(config: &RateLimitConfig, minute: Duration, hour: Duration) -> Self {
        Self {
            windows: Mutex::new((
                Window::new(config.max_per_minute, minute),
                Window::new(config.max_per_hour, hour),
            )),
            minute_length: minute,
        }
    }

    fn lock(&self) -> RelayResult<std::sync::MutexGuard<'_, (Window, Window)>> {
        self.windows
            .lock()
            .map_err(|_| RelayError::Internal("限速器锁中毒".to_string()))
    }

    /// 两个窗口都有余量才放行；返回None表示放行，
    /// 否则返回建议等待时长。
    fn check(&self) -> RelayResult<Option<Duration>> {
        let mut windows = self.lock()?;
        let now = Instant::now();
        let (minute, hour) = &mut *windows;
        minute.refresh(now);
        hour.refresh(now);

        if minute.has_capacity() && hour.has_capacity() {
            return Ok(None);
        }

        let remaining = match (minute.has_capacity(), hour.has_capacity()) {
            (false, false) => minute.remaining(now).min(hour.remaining(now)),
            (false, true) => minute.remaining(now),
            _ => hour.remaining(now),
        };
        // 夹取边界按分钟窗长度等比缩放（60秒窗对应1~5秒）
        let min_wait = self.minute_length / 60;
        let max_wait = self.minute_length / 12;
        Ok(Some(remaining.clamp(min_wait, max_wait)))
    }

    /// 阻塞直到两个窗口都放行
    pub async fn wait_until_allowed(&self) -> RelayResult<()> {
        loop {
            match self.check()? {
                None => return Ok(()),
                Some(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "限速等待");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// 发送成功后计入两个窗口
    pub fn record_sent(&self) -> RelayResult<()> {
        let mut windows = self.lock()?;
        let now = Instant::now();
        let (minute, hour) = &mut *windows;
        minute.refresh(now);
        hour.refresh(now);
        minute.count += 1;
        hour.count += 1;
        Ok(())
    }

    pub fn status(&self) -> RelayResult<RateLimitStatus> {
        let mut windows = self.lock()?;
        let now = Instant::now();
        let (minute, hour) = &mut *windows;
        minute.refresh(now);
        hour.refresh(now);
        Ok(RateLimitStatus {
            minute_count: minute.count,
            minute_limit: minute.limit,
            hour_count: hour.count,
            hour_limit: hour.limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(per_minute: u32, per_hour: u32) -> RateLimitConfig {
        RateLimitConfig {
            max_per_minute: per_minute,
            max_per_hour: per_hour,
        }
    }

    #[tokio::test]
    async fn test_allows_under_limit() {
        let limiter = RateLimiter::new(&config(2, 10));
        limiter.wait_until_allowed().await.unwrap();
        limiter.record_sent().unwrap();
        limiter.wait_until_allowed().await.unwrap();

        let status = limiter.status().unwrap();
        assert_eq!(status.minute_count, 1);
        assert_eq!(status.hour_count, 1);
    }

    #[tokio::test]
    async fn test_blocks_until_minute_window_resets() {
        let limiter = RateLimiter::with_windows(
            &config(1, 100),
            Duration::from_millis(80),
            Duration::from_secs(10),
        );
        limiter.record_sent().unwrap();

        let started = Instant::now();
        limiter.wait_until_allowed().await.unwrap();
        // 必须等到分钟窗过期
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_hour_window_also_enforced() {
        let limiter = RateLimiter::with_windows(
            &config(100, 1),
            Duration::from_millis(20),
            Duration::from_millis(120),
        );
        limiter.record_sent().unwrap();

        let started = Instant::now();
        limiter.wait_until_allowed().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_window_reset_clears_count() {
        let limiter = RateLimiter::with_windows(
            &config(1, 100),
            Duration::from_millis(30),
            Duration::from_secs(10),
        );
        limiter.record_sent().unwrap();
        assert_eq!(limiter.status().unwrap().minute_count, 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(limiter.status().unwrap().minute_count, 0);
    }
}
