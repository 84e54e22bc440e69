//! 装配通道协议
//!
//! 入站端以事件流驱动装配器：begin-batch开启批次，chunk逐块上传，
//! complete触发收集，abort丢弃。每个事件都有确认或错误应答，
//! 发送方据此决定重传或放弃。

use std::sync::Arc;

use relay_core::{ChunkPayload, ExtractedRecord, RelayResult};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::assembler::BatchAssembler;

/// 入站事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ChannelEvent {
    BeginBatch {
        total_chunks: u32,
    },
    Chunk {
        batch_id: String,
        index: u32,
        payload: ChunkPayload,
    },
    Complete {
        batch_id: String,
    },
    Abort {
        batch_id: String,
    },
}

/// 错误应答的原因码，发送方按原因决定是否重传
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelErrorReason {
    InitError,
    ChunkStoreError,
    CompletionError,
}

/// 出站应答
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "kebab-case")]
pub enum ChannelReply {
    BatchReady {
        batch_id: String,
    },
    ChunkAck {
        batch_id: String,
        index: u32,
        received: u32,
    },
    CompleteAck {
        batch_id: String,
        record_count: usize,
    },
    AbortAck {
        batch_id: String,
    },
    Error {
        reason: ChannelErrorReason,
        message: String,
    },
}

/// 事件处理结果：应答总是产生，完整批次的记录只在complete时出现
#[derive(Debug)]
pub struct HandledEvent {
    pub reply: ChannelReply,
    pub records: Option<Vec<ExtractedRecord>>,
}

impl HandledEvent {
    fn reply_only(reply: ChannelReply) -> Self {
        Self {
            reply,
            records: None,
        }
    }
}

/// 通道事件处理器
pub struct ChannelHandler {
    assembler: Arc<BatchAssembler>,
}

impl ChannelHandler {
    pub fn new(assembler: Arc<BatchAssembler>) -> Self {
        Self { assembler }
    }

    /// 处理单个事件
    ///
    /// 装配器的错误不向上传播，统一折叠成错误应答，
    /// 通道本身保持存活。
    pub async fn handle(&self, event: ChannelEvent) -> HandledEvent {
        match event {
            ChannelEvent::BeginBatch { total_chunks } => {
                match self.assembler.begin(total_chunks).await {
                    Ok(batch_id) => {
                        HandledEvent::reply_only(ChannelReply::BatchReady { batch_id })
                    }
                    Err(e) => {
                        error!(error = %e, "批次初始化失败");
                        HandledEvent::reply_only(ChannelReply::Error {
                            reason: ChannelErrorReason::InitError,
                            message: e.to_string(),
                        })
                    }
                }
            }
            ChannelEvent::Chunk {
                batch_id,
                index,
                payload,
            } => match self.assembler.accept_chunk(&batch_id, index, payload).await {
                Ok(received) => HandledEvent::reply_only(ChannelReply::ChunkAck {
                    batch_id,
                    index,
                    received,
                }),
                Err(e) => {
                    error!(batch_id = %batch_id, index, error = %e, "分块入库失败");
                    HandledEvent::reply_only(ChannelReply::Error {
                        reason: ChannelErrorReason::ChunkStoreError,
                        message: e.to_string(),
                    })
                }
            },
            ChannelEvent::Complete { batch_id } => match self.complete(&batch_id).await {
                Ok(records) => {
                    info!(batch_id = %batch_id, record_count = records.len(), "批次收集完成");
                    HandledEvent {
                        reply: ChannelReply::CompleteAck {
                            batch_id,
                            record_count: records.len(),
                        },
                        records: Some(records),
                    }
                }
                Err(e) => {
                    error!(batch_id = %batch_id, error = %e, "批次收集失败");
                    HandledEvent::reply_only(ChannelReply::Error {
                        reason: ChannelErrorReason::CompletionError,
                        message: e.to_string(),
                    })
                }
            },
            ChannelEvent::Abort { batch_id } => match self.assembler.abort(&batch_id).await {
                Ok(()) => HandledEvent::reply_only(ChannelReply::AbortAck { batch_id }),
                Err(e) => HandledEvent::reply_only(ChannelReply::Error {
                    reason: ChannelErrorReason::ChunkStoreError,
                    message: e.to_string(),
                }),
            },
        }
    }

    async fn complete(&self, batch_id: &str) -> RelayResult<Vec<ExtractedRecord>> {
        self.assembler.try_complete(batch_id).await?;
        self.assembler.collect_and_clear(batch_id).await
    }
}
