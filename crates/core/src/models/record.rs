use serde::{Deserialize, Serialize};

/// 上游解码出的单条联系人记录
///
/// 每条记录归属一个作者实体，可携带多个邮箱/电话标识。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub id: i64,
    pub author: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub phone_numbers: Vec<String>,
    pub linkedin_url: Option<String>,
}

/// 中继主题上的一条消息：严格递增的字符串键 + 记录本体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMessage {
    pub key: String,
    pub record: ExtractedRecord,
}

impl RecordMessage {
    pub fn new(key: String, record: ExtractedRecord) -> Self {
        Self { key, record }
    }

    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn deserialize(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_message_roundtrip() {
        let record = ExtractedRecord {
            id: 7,
            author: Some("Ada".to_string()),
            content: Some("hello".to_string()),
            emails: vec!["ada@example.com".to_string()],
            phone_numbers: vec![],
            linkedin_url: None,
        };
        let message = RecordMessage::new("3".to_string(), record.clone());
        let json = message.serialize().unwrap();
        let parsed = RecordMessage::deserialize(&json).unwrap();
        assert_eq!(parsed.key, "3");
        assert_eq!(parsed.record, record);
    }

    #[test]
    fn test_missing_collections_default_empty() {
        let json = r#"{"id":1,"author":null,"content":null,"linkedin_url":null}"#;
        let record: ExtractedRecord = serde_json::from_str(json).unwrap();
        assert!(record.emails.is_empty());
        assert!(record.phone_numbers.is_empty());
    }
}
