use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::RelayResult;

/// 批次瞬态状态的键值存储抽象
///
/// 建模为「键 → 哈希(字段 → 字符串值)」，与Redis哈希语义对齐。
/// 所有批次键都带TTL，过期后按不存在处理。
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// 写入或覆盖多个字段
    async fn put_fields(&self, key: &str, fields: &[(String, String)]) -> RelayResult<()>;

    /// 读取单个字段
    async fn get_field(&self, key: &str, field: &str) -> RelayResult<Option<String>>;

    /// 批量读取字段，保持请求顺序
    async fn get_fields(&self, key: &str, fields: &[&str]) -> RelayResult<Vec<Option<String>>>;

    /// 读取整个哈希
    async fn get_all(&self, key: &str) -> RelayResult<HashMap<String, String>>;

    /// 写入或覆盖单个字段
    async fn set_field(&self, key: &str, field: &str, value: &str) -> RelayResult<()>;

    /// 仅当字段不存在时写入，返回是否为首次写入。
    /// 分块去重计数依赖这里的原子性。
    async fn put_field_if_absent(&self, key: &str, field: &str, value: &str)
        -> RelayResult<bool>;

    /// 原子递增整数字段，返回递增后的值
    async fn increment_field(&self, key: &str, field: &str, delta: i64) -> RelayResult<i64>;

    /// 设置键的存活时间
    async fn expire(&self, key: &str, ttl: Duration) -> RelayResult<()>;

    /// 键是否存在（未过期）
    async fn exists(&self, key: &str) -> RelayResult<bool>;

    /// 删除一组键
    async fn delete(&self, keys: &[&str]) -> RelayResult<()>;
}
