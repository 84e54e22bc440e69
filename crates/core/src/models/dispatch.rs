use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 投递队列中的一条工作项：内容与收件邮箱的引用对
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchItem {
    pub content_id: i64,
    pub email_id: i64,
    pub enqueued_at: DateTime<Utc>,
}

impl DispatchItem {
    pub fn new(content_id: i64, email_id: i64) -> Self {
        Self {
            content_id,
            email_id,
            enqueued_at: Utc::now(),
        }
    }

    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn deserialize(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// 轮询器的终止方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrainOutcome {
    /// 连续空轮询达到阈值，队列已排空
    Completed,
    /// 外部调用stop()主动停止
    Stopped,
    /// 重试耗尽后放弃
    Error,
}

/// 一次排空运行的完成记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainReport {
    pub status: DrainOutcome,
    pub message: String,
    pub processed_count: u64,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl DrainReport {
    pub fn new(
        status: DrainOutcome,
        message: impl Into<String>,
        processed_count: u64,
        started_at: DateTime<Utc>,
        error: Option<String>,
    ) -> Self {
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        Self {
            status,
            message: message.into(),
            processed_count,
            duration_ms,
            started_at,
            finished_at,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_item_roundtrip() {
        let item = DispatchItem::new(42, 7);
        let json = item.serialize().unwrap();
        let parsed = DispatchItem::deserialize(&json).unwrap();
        assert_eq!(parsed, item);
    }

    #[test]
    fn test_report_duration_non_negative() {
        let report = DrainReport::new(DrainOutcome::Completed, "drained", 5, Utc::now(), None);
        assert_eq!(report.processed_count, 5);
        assert!(report.finished_at >= report.started_at);
    }
}
