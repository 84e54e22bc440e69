//! 内存批次存储
//!
//! 用哈希表模拟Redis哈希。TTL不靠后台线程回收，而是在每次
//! 访问时检查过期时间，过期的键等同于不存在。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use relay_core::{BatchStore, RelayError, RelayResult};

struct Entry {
    fields: HashMap<String, String>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new() -> Self {
        Self {
            fields: HashMap::new(),
            expires_at: None,
        }
    }

    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }
}

/// 内存批次存储
pub struct MemoryBatchStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryBatchStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> RelayResult<std::sync::MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| RelayError::store_error("memory store lock poisoned"))
    }

    /// 清理过期键，返回对应键的可变引用（不存在或已过期时为None）
    fn live_entry<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
    ) -> Option<&'a mut Entry> {
        if entries.get(key).is_some_and(|e| e.is_expired()) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

impl Default for MemoryBatchStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BatchStore for MemoryBatchStore {
    async fn put_fields(&self, key: &str, fields: &[(String, String)]) -> RelayResult<()> {
        let mut entries = self.lock()?;
        if entries.get(key).is_some_and(|e| e.is_expired()) {
            entries.remove(key);
        }
        let entry = entries.entry(key.to_string()).or_insert_with(Entry::new);
        for (field, value) in fields {
            entry.fields.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn get_field(&self, key: &str, field: &str) -> RelayResult<Option<String>> {
        let mut entries = self.lock()?;
        Ok(Self::live_entry(&mut entries, key).and_then(|e| e.fields.get(field).cloned()))
    }

    async fn get_fields(&self, key: &str, fields: &[&str]) -> RelayResult<Vec<Option<String>>> {
        let mut entries = self.lock()?;
        match Self::live_entry(&mut entries, key) {
            Some(entry) => Ok(fields
                .iter()
                .map(|f| entry.fields.get(*f).cloned())
                .collect()),
            None => Ok(vec![None; fields.len()]),
        }
    }

    async fn get_all(&self, key: &str) -> RelayResult<HashMap<String, String>> {
        let mut entries = self.lock()?;
        Ok(Self::live_entry(&mut entries, key)
            .map(|e| e.fields.clone())
            .unwrap_or_default())
    }

    async fn set_field(&self, key: &str, field: &str, value: &str) -> RelayResult<()> {
        let mut entries = self.lock()?;
        if entries.get(key).is_some_and(|e| e.is_expired()) {
            entries.remove(key);
        }
        let entry = entries.entry(key.to_string()).or_insert_with(Entry::new);
        entry.fields.insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn put_field_if_absent(&self, key: &str, field: &str, value: &str) -> RelayResult<bool> {
        let mut entries = self.lock()?;
        if entries.get(key).is_some_and(|e| e.is_expired()) {
            entries.remove(key);
        }
        let entry = entries.entry(key.to_string()).or_insert_with(Entry::new);
        if entry.fields.contains_key(field) {
            Ok(false)
        } else {
            entry.fields.insert(field.to_string(), value.to_string());
            Ok(true)
        }
    }

    async fn increment_field(&self, key: &str, field: &str, delta: i64) -> RelayResult<i64> {
        let mut entries = self.lock()?;
        if entries.get(key).is_some_and(|e| e.is_expired()) {
            entries.remove(key);
        }
        let entry = entries.entry(key.to_string()).or_insert_with(Entry::new);
        let current: i64 = entry
            .fields
            .get(field)
            .map(|v| {
                v.parse().map_err(|_| {
                    RelayError::store_error(format!("field {} is not an integer", field))
                })
            })
            .transpose()?
            .unwrap_or(0);
        let next = current + delta;
        entry.fields.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> RelayResult<()> {
        let mut entries = self.lock()?;
        if let Some(entry) = Self::live_entry(&mut entries, key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> RelayResult<bool> {
        let mut entries = self.lock()?;
        Ok(Self::live_entry(&mut entries, key).is_some())
    }

    async fn delete(&self, keys: &[&str]) -> RelayResult<()> {
        let mut entries = self.lock()?;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get_fields() {
        let store = MemoryBatchStore::new();
        store
            .put_fields(
                "batch:a:metadata",
                &[
                    ("totalChunks".to_string(), "3".to_string()),
                    ("status".to_string(), "initializing".to_string()),
                ],
            )
            .await
            .unwrap();

        let values = store
            .get_fields("batch:a:metadata", &["totalChunks", "status", "missing"])
            .await
            .unwrap();
        assert_eq!(values[0].as_deref(), Some("3"));
        assert_eq!(values[1].as_deref(), Some("initializing"));
        assert_eq!(values[2], None);
    }

    #[tokio::test]
    async fn test_put_field_if_absent_only_once() {
        let store = MemoryBatchStore::new();
        assert!(store
            .put_field_if_absent("batch:a:chunks", "0", "first")
            .await
            .unwrap());
        assert!(!store
            .put_field_if_absent("batch:a:chunks", "0", "second")
            .await
            .unwrap());
        assert_eq!(
            store.get_field("batch:a:chunks", "0").await.unwrap(),
            Some("first".to_string())
        );
    }

    #[tokio::test]
    async fn test_increment_field() {
        let store = MemoryBatchStore::new();
        assert_eq!(
            store
                .increment_field("batch:a:metadata", "receivedChunks", 1)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .increment_field("batch:a:metadata", "receivedChunks", 1)
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_expired_key_behaves_as_missing() {
        let store = MemoryBatchStore::new();
        store
            .set_field("batch:a:metadata", "status", "processing")
            .await
            .unwrap();
        store
            .expire("batch:a:metadata", Duration::from_millis(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!store.exists("batch:a:metadata").await.unwrap());
        assert_eq!(
            store.get_field("batch:a:metadata", "status").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_delete_removes_keys() {
        let store = MemoryBatchStore::new();
        store.set_field("k1", "f", "v").await.unwrap();
        store.set_field("k2", "f", "v").await.unwrap();
        store.delete(&["k1", "k2"]).await.unwrap();
        assert!(!store.exists("k1").await.unwrap());
        assert!(!store.exists("k2").await.unwrap());
    }
}
