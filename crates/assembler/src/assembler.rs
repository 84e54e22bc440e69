//! 批次装配器
//!
//! 每个批次占用两个哈希键：`{prefix}{id}:metadata` 存计数与状态，
//! `{prefix}{id}:chunks` 按索引存分块信封。分块可乱序、可重复到达，
//! 收到计数只在首次到达时递增，重复到达覆盖旧值并累加attempts。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use relay_core::{
    BatchMetadata, BatchStatus, BatchStore, ChunkEnvelope, ChunkPayload, ExtractedRecord,
    RelayError, RelayResult,
};
use relay_core::config::BatchConfig;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 批次装配器
pub struct BatchAssembler {
    store: Arc<dyn BatchStore>,
    config: BatchConfig,
}

impl BatchAssembler {
    pub fn new(store: Arc<dyn BatchStore>, config: BatchConfig) -> Self {
        Self { store, config }
    }

    fn metadata_key(&self, batch_id: &str) -> String {
        format!("{}{}:metadata", self.config.key_prefix, batch_id)
    }

    fn chunks_key(&self, batch_id: &str) -> String {
        format!("{}{}:chunks", self.config.key_prefix, batch_id)
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.ttl_seconds)
    }

    /// 开启新批次，返回批次ID
    ///
    /// 元数据初始状态为initializing，两个键都带TTL，
    /// 装配中断的批次靠过期回收。
    pub async fn begin(&self, total_chunks: u32) -> RelayResult<String> {
        if total_chunks == 0 {
            return Err(RelayError::Internal(
                "批次至少要包含一个分块".to_string(),
            ));
        }
        let batch_id = Uuid::new_v4().to_string();
        let metadata_key = self.metadata_key(batch_id.as_str());
        let now_ms = Utc::now().timestamp_millis();

        self.store
            .put_fields(
                &metadata_key,
                &[
                    ("totalChunks".to_string(), total_chunks.to_string()),
                    ("receivedChunks".to_string(), "0".to_string()),
                    (
                        "status".to_string(),
                        BatchStatus::Initializing.as_str().to_string(),
                    ),
                    ("startTime".to_string(), now_ms.to_string()),
                ],
            )
            .await?;
        self.store.expire(&metadata_key, self.ttl()).await?;

        info!(batch_id = %batch_id, total_chunks, "批次已创建");
        Ok(batch_id)
    }

    /// 接收一个分块，返回当前已收到的分块数
    ///
    /// 首次到达的索引递增计数；重复索引覆盖旧信封并累加attempts，
    /// 计数不变。每次到达都刷新两个键的TTL。
    pub async fn accept_chunk(
        &self,
        batch_id: &str,
        index: u32,
        payload: ChunkPayload,
    ) -> RelayResult<u32> {
        let metadata_key = self.metadata_key(batch_id);
        let chunks_key = self.chunks_key(batch_id);

        let total: u32 = match self
            .store
            .get_field(&metadata_key, "totalChunks")
            .await?
            .and_then(|v| v.parse().ok())
        {
            Some(total) => total,
            None => return Err(RelayError::batch_not_found(batch_id)),
        };
        // 越界索引会让接收计数超过总数，直接拒绝
        if index >= total {
            return Err(RelayError::Internal(format!(
                "分块索引越界: {index} (总数 {total})"
            )));
        }

        let field = index.to_string();
        let envelope = ChunkEnvelope::new(payload, Utc::now().timestamp_millis());
        let serialized = serde_json::to_string(&envelope)?;

        let first_arrival = self
            .store
            .put_field_if_absent(&chunks_key, &field, &serialized)
            .await?;

        let received = if first_arrival {
            self.store
                .increment_field(&metadata_key, "receivedChunks", 1)
                .await? as u32
        } else {
            // 重复到达：保留首个时间戳之外的全部新数据，attempts累加
            let attempts = self
                .store
                .get_field(&chunks_key, &field)
                .await?
                .and_then(|raw| serde_json::from_str::<ChunkEnvelope>(&raw).ok())
                .map(|prev| prev.attempts)
                .unwrap_or(0);
            let mut retry = envelope;
            retry.attempts = attempts + 1;
            self.store
                .set_field(&chunks_key, &field, &serde_json::to_string(&retry)?)
                .await?;
            warn!(batch_id = %batch_id, index, attempts = retry.attempts, "分块重复到达，已覆盖");
            self.store
                .get_field(&metadata_key, "receivedChunks")
                .await?
                .and_then(|v| v.parse().ok())
                .unwrap_or(0)
        };

        self.store
            .set_field(&metadata_key, "status", BatchStatus::Processing.as_str())
            .await?;
        self.store.expire(&metadata_key, self.ttl()).await?;
        self.store.expire(&chunks_key, self.ttl()).await?;

        debug!(batch_id = %batch_id, index, received, "分块已入库");
        Ok(received)
    }

    /// 完成判定：计数相等即视为完整，不检查索引连续性
    ///
    /// 完整时将状态推进到completed并返回true，否则返回false。
    pub async fn try_complete(&self, batch_id: &str) -> RelayResult<bool> {
        let metadata_key = self.metadata_key(batch_id);
        let values = self
            .store
            .get_fields(&metadata_key, &["totalChunks", "receivedChunks"])
            .await?;

        let total: u32 = match values[0].as_deref().and_then(|v| v.parse().ok()) {
            Some(v) => v,
            None => return Err(RelayError::batch_not_found(batch_id)),
        };
        let received: u32 = values[1]
            .as_deref()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        if received == total {
            self.store
                .set_field(&metadata_key, "status", BatchStatus::Completed.as_str())
                .await?;
            info!(batch_id = %batch_id, total, "批次装配完成");
            Ok(true)
        } else {
            debug!(batch_id = %batch_id, received, total, "批次尚未完整");
            Ok(false)
        }
    }

    /// 收集完整批次的全部记录并清理存储
    ///
    /// 仅接受completed状态的批次；分块按索引升序拼接，
    /// 返回前删除两个键。
    pub async fn collect_and_clear(&self, batch_id: &str) -> RelayResult<Vec<ExtractedRecord>> {
        let metadata_key = self.metadata_key(batch_id);
        let chunks_key = self.chunks_key(batch_id);

        let values = self
            .store
            .get_fields(
                &metadata_key,
                &["status", "receivedChunks", "totalChunks"],
            )
            .await?;
        let status = match values[0].as_deref() {
            Some(s) => BatchStatus::parse(s)?,
            None => return Err(RelayError::batch_not_found(batch_id)),
        };
        if status != BatchStatus::Completed {
            let received = values[1].as_deref().and_then(|v| v.parse().ok()).unwrap_or(0);
            let expected = values[2].as_deref().and_then(|v| v.parse().ok()).unwrap_or(0);
            return Err(RelayError::IncompleteBatch {
                id: batch_id.to_string(),
                received,
                expected,
            });
        }

        let raw_chunks = self.store.get_all(&chunks_key).await?;
        let mut indexed: Vec<(u32, ChunkEnvelope)> = Vec::with_capacity(raw_chunks.len());
        for (field, raw) in raw_chunks {
            let index: u32 = field.parse().map_err(|_| {
                RelayError::Serialization(format!("非法分块索引: {field}"))
            })?;
            let envelope: ChunkEnvelope = serde_json::from_str(&raw)?;
            indexed.push((index, envelope));
        }
        indexed.sort_by_key(|(index, _)| *index);

        let records: Vec<ExtractedRecord> = indexed
            .into_iter()
            .flat_map(|(_, envelope)| envelope.data.records)
            .collect();

        self.store.delete(&[&metadata_key, &chunks_key]).await?;
        info!(batch_id = %batch_id, record_count = records.len(), "批次已收集并清理");
        Ok(records)
    }

    /// 中止批次，立即清理两个键
    pub async fn abort(&self, batch_id: &str) -> RelayResult<()> {
        let metadata_key = self.metadata_key(batch_id);
        let chunks_key = self.chunks_key(batch_id);
        self.store.delete(&[&metadata_key, &chunks_key]).await?;
        warn!(batch_id = %batch_id, "批次已中止");
        Ok(())
    }

    /// 批次元数据快照
    pub async fn metadata(&self, batch_id: &str) -> RelayResult<BatchMetadata> {
        let metadata_key = self.metadata_key(batch_id);
        let values = self
            .store
            .get_fields(
                &metadata_key,
                &["totalChunks", "receivedChunks", "status", "startTime"],
            )
            .await?;

        let total_chunks: u32 = match values[0].as_deref().and_then(|v| v.parse().ok()) {
            Some(v) => v,
            None => return Err(RelayError::batch_not_found(batch_id)),
        };
        Ok(BatchMetadata {
            total_chunks,
            received_chunks: values[1]
                .as_deref()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            status: values[2]
                .as_deref()
                .map(BatchStatus::parse)
                .transpose()?
                .unwrap_or(BatchStatus::Error),
            start_time: values[3]
                .as_deref()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_infrastructure::MemoryBatchStore;

    fn assembler() -> BatchAssembler {
        BatchAssembler::new(Arc::new(MemoryBatchStore::new()), BatchConfig::default())
    }

    fn payload(ids: &[i64]) -> ChunkPayload {
        ChunkPayload {
            records: ids
                .iter()
                .map(|id| ExtractedRecord {
                    id: *id,
                    author: Some(format!("author-{}", id)),
                    content: Some("hello".to_string()),
                    emails: vec![format!("a{}@example.com", id)],
                    phone_numbers: vec![],
                    linkedin_url: None,
                })
                .collect(),
            size_in_mb: 0.1,
        }
    }

    #[tokio::test]
    async fn test_begin_initializes_metadata() {
        let assembler = assembler();
        let batch_id = assembler.begin(3).await.unwrap();

        let meta = assembler.metadata(&batch_id).await.unwrap();
        assert_eq!(meta.total_chunks, 3);
        assert_eq!(meta.received_chunks, 0);
        assert_eq!(meta.status, BatchStatus::Initializing);
    }

    #[tokio::test]
    async fn test_begin_rejects_zero_chunks() {
        assert!(assembler().begin(0).await.is_err());
    }

    #[tokio::test]
    async fn test_out_of_order_chunks_collected_in_index_order() {
        let assembler = assembler();
        let batch_id = assembler.begin(3).await.unwrap();

        // 到达顺序 1, 0, 2
        assembler
            .accept_chunk(&batch_id, 1, payload(&[10, 11]))
            .await
            .unwrap();
        assembler
            .accept_chunk(&batch_id, 0, payload(&[1]))
            .await
            .unwrap();
        assembler
            .accept_chunk(&batch_id, 2, payload(&[20]))
            .await
            .unwrap();

        assert!(assembler.try_complete(&batch_id).await.unwrap());
        let records = assembler.collect_and_clear(&batch_id).await.unwrap();
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 10, 11, 20]);

        // 收集后键已清理
        assert!(matches!(
            assembler.metadata(&batch_id).await,
            Err(RelayError::BatchNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_chunk_does_not_advance_count() {
        let assembler = assembler();
        let batch_id = assembler.begin(2).await.unwrap();

        assert_eq!(
            assembler
                .accept_chunk(&batch_id, 0, payload(&[1]))
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            assembler
                .accept_chunk(&batch_id, 0, payload(&[2]))
                .await
                .unwrap(),
            1
        );
        assert!(!assembler.try_complete(&batch_id).await.unwrap());

        assembler
            .accept_chunk(&batch_id, 1, payload(&[3]))
            .await
            .unwrap();
        assert!(assembler.try_complete(&batch_id).await.unwrap());

        // 重复到达以新数据为准
        let records = assembler.collect_and_clear(&batch_id).await.unwrap();
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_out_of_range_index_rejected() {
        let assembler = assembler();
        let batch_id = assembler.begin(2).await.unwrap();
        assert!(assembler
            .accept_chunk(&batch_id, 2, payload(&[1]))
            .await
            .is_err());
        assert_eq!(
            assembler.metadata(&batch_id).await.unwrap().received_chunks,
            0
        );
    }

    #[tokio::test]
    async fn test_chunk_for_unknown_batch_rejected() {
        let assembler = assembler();
        let err = assembler
            .accept_chunk("missing", 0, payload(&[1]))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::BatchNotFound { .. }));
    }

    #[tokio::test]
    async fn test_collect_incomplete_batch_rejected() {
        let assembler = assembler();
        let batch_id = assembler.begin(2).await.unwrap();
        assembler
            .accept_chunk(&batch_id, 0, payload(&[1]))
            .await
            .unwrap();

        let err = assembler.collect_and_clear(&batch_id).await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::IncompleteBatch {
                received: 1,
                expected: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_abort_clears_batch() {
        let assembler = assembler();
        let batch_id = assembler.begin(2).await.unwrap();
        assembler
            .accept_chunk(&batch_id, 0, payload(&[1]))
            .await
            .unwrap();

        assembler.abort(&batch_id).await.unwrap();
        assert!(matches!(
            assembler.metadata(&batch_id).await,
            Err(RelayError::BatchNotFound { .. })
        ));
    }
}
