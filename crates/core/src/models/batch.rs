use serde::{Deserialize, Serialize};

use crate::errors::{RelayError, RelayResult};
use crate::models::record::ExtractedRecord;

/// 批次生命周期状态
///
/// 状态流转: initializing → processing → completed | error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Initializing,
    Processing,
    Completed,
    Error,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Initializing => "initializing",
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> RelayResult<Self> {
        match s {
            "initializing" => Ok(BatchStatus::Initializing),
            "processing" => Ok(BatchStatus::Processing),
            "completed" => Ok(BatchStatus::Completed),
            "error" => Ok(BatchStatus::Error),
            other => Err(RelayError::Serialization(format!(
                "unknown batch status: {other}"
            ))),
        }
    }
}

/// 批次元数据，对应存储中的 `batch:{id}:metadata` 哈希
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMetadata {
    pub total_chunks: u32,
    pub received_chunks: u32,
    pub status: BatchStatus,
    /// 创建时刻（Unix毫秒）
    pub start_time: i64,
}

impl BatchMetadata {
    pub fn new(total_chunks: u32, start_time: i64) -> Self {
        Self {
            total_chunks,
            received_chunks: 0,
            status: BatchStatus::Initializing,
            start_time,
        }
    }

    /// 完成判定只看计数，不看索引连续性
    pub fn is_complete(&self) -> bool {
        self.received_chunks == self.total_chunks
    }
}

/// 单个分块携带的记录载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub records: Vec<ExtractedRecord>,
    #[serde(default)]
    pub size_in_mb: f64,
}

/// 分块存储信封，对应 `batch:{id}:chunks` 哈希中每个索引字段的JSON值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkEnvelope {
    pub data: ChunkPayload,
    /// 到达时刻（Unix毫秒）
    pub timestamp: i64,
    pub attempts: u32,
}

impl ChunkEnvelope {
    pub fn new(data: ChunkPayload, timestamp: i64) -> Self {
        Self {
            data,
            timestamp,
            attempts: 1,
        }
    }
}
