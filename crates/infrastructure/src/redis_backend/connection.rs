use std::time::Duration;

use redis::{Client, Connection, RedisResult};
use relay_core::config::RedisConfig;
use relay_core::{RelayError, RelayResult};
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Redis连接管理器，带连接重试
pub struct RedisConnectionManager {
    client: Client,
    config: RedisConfig,
}

impl RedisConnectionManager {
    pub async fn new(config: RedisConfig) -> RelayResult<Self> {
        let redis_url = config.build_connection_url();
        let client = Client::open(redis_url)
            .map_err(|e| RelayError::store_error(format!("Failed to create Redis client: {e}")))?;

        let manager = Self { client, config };
        manager.test_connection().await?;
        debug!(
            "Successfully connected to Redis at {}:{}",
            manager.config.host, manager.config.port
        );

        Ok(manager)
    }

    /// 执行单条命令，连接失败时按配置重试
    pub async fn execute_command<T: redis::FromRedisValue>(
        &self,
        cmd: &redis::Cmd,
    ) -> RelayResult<T> {
        let mut conn = self.get_connection_with_retry().await?;
        cmd.query(&mut conn)
            .map_err(|e| RelayError::store_error(format!("Redis command failed: {e}")))
    }

    async fn get_connection_with_retry(&self) -> RelayResult<Connection> {
        let mut last_error = None;

        for attempt in 0..self.config.max_retry_attempts {
            match self.client.get_connection() {
                Ok(conn) => {
                    if attempt > 0 {
                        debug!(
                            "Successfully reconnected to Redis after {} attempts",
                            attempt + 1
                        );
                    }
                    return Ok(conn);
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.config.max_retry_attempts - 1 {
                        warn!(
                            "Failed to connect to Redis (attempt {}/{}): {}. Retrying in {}s...",
                            attempt + 1,
                            self.config.max_retry_attempts,
                            last_error.as_ref().unwrap(),
                            self.config.retry_delay_seconds
                        );
                        sleep(Duration::from_secs(self.config.retry_delay_seconds)).await;
                    }
                }
            }
        }

        let error_msg = format!(
            "Failed to connect to Redis after {} attempts. Last error: {}",
            self.config.max_retry_attempts,
            last_error.map_or("Unknown".to_string(), |e| e.to_string())
        );
        error!("{}", error_msg);
        Err(RelayError::store_error(error_msg))
    }

    async fn test_connection(&self) -> RelayResult<()> {
        let mut conn = self.get_connection_with_retry().await?;
        let result: RedisResult<String> = redis::cmd("PING").query(&mut conn);
        match result {
            Ok(response) if response == "PONG" => Ok(()),
            Ok(response) => Err(RelayError::store_error(format!(
                "Unexpected PING response: {response}"
            ))),
            Err(e) => Err(RelayError::store_error(format!("Redis PING failed: {e}"))),
        }
    }
}
