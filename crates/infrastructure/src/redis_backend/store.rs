use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_core::{BatchStore, RelayResult};
use tracing::debug;

use super::connection::RedisConnectionManager;

/// 基于Redis哈希的批次状态存储
///
/// HSETNX承担分块去重判定，HINCRBY承担接收计数的原子递增。
pub struct RedisBatchStore {
    connection_manager: Arc<RedisConnectionManager>,
}

impl RedisBatchStore {
    pub fn new(connection_manager: Arc<RedisConnectionManager>) -> Self {
        Self { connection_manager }
    }
}

#[async_trait]
impl BatchStore for RedisBatchStore {
    async fn put_fields(&self, key: &str, fields: &[(String, String)]) -> RelayResult<()> {
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        let _: i64 = self.connection_manager.execute_command(&cmd).await?;
        Ok(())
    }

    async fn get_field(&self, key: &str, field: &str) -> RelayResult<Option<String>> {
        let mut cmd = redis::cmd("HGET");
        cmd.arg(key).arg(field);
        self.connection_manager.execute_command(&cmd).await
    }

    async fn get_fields(&self, key: &str, fields: &[&str]) -> RelayResult<Vec<Option<String>>> {
        let mut cmd = redis::cmd("HMGET");
        cmd.arg(key);
        for field in fields {
            cmd.arg(field);
        }
        self.connection_manager.execute_command(&cmd).await
    }

    async fn get_all(&self, key: &str) -> RelayResult<HashMap<String, String>> {
        let mut cmd = redis::cmd("HGETALL");
        cmd.arg(key);
        self.connection_manager.execute_command(&cmd).await
    }

    async fn set_field(&self, key: &str, field: &str, value: &str) -> RelayResult<()> {
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key).arg(field).arg(value);
        let _: i64 = self.connection_manager.execute_command(&cmd).await?;
        Ok(())
    }

    async fn put_field_if_absent(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> RelayResult<bool> {
        let mut cmd = redis::cmd("HSETNX");
        cmd.arg(key).arg(field).arg(value);
        let inserted: i64 = self.connection_manager.execute_command(&cmd).await?;
        Ok(inserted == 1)
    }

    async fn increment_field(&self, key: &str, field: &str, delta: i64) -> RelayResult<i64> {
        let mut cmd = redis::cmd("HINCRBY");
        cmd.arg(key).arg(field).arg(delta);
        self.connection_manager.execute_command(&cmd).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> RelayResult<()> {
        let mut cmd = redis::cmd("EXPIRE");
        cmd.arg(key).arg(ttl.as_secs());
        let _: i64 = self.connection_manager.execute_command(&cmd).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> RelayResult<bool> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        let found: i64 = self.connection_manager.execute_command(&cmd).await?;
        Ok(found == 1)
    }

    async fn delete(&self, keys: &[&str]) -> RelayResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("DEL");
        for key in keys {
            cmd.arg(key);
        }
        let deleted: i64 = self.connection_manager.execute_command(&cmd).await?;
        debug!("Deleted {} of {} keys", deleted, keys.len());
        Ok(())
    }
}
