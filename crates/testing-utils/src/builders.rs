//! 测试数据构造器

use relay_core::{ChunkPayload, ExtractedRecord};

/// 抽取记录构造器
pub struct RecordBuilder {
    record: ExtractedRecord,
}

impl RecordBuilder {
    pub fn new(id: i64) -> Self {
        Self {
            record: ExtractedRecord {
                id,
                author: None,
                content: None,
                emails: Vec::new(),
                phone_numbers: Vec::new(),
                linkedin_url: None,
            },
        }
    }

    pub fn author(mut self, name: &str) -> Self {
        self.record.author = Some(name.to_string());
        self
    }

    pub fn content(mut self, body: &str) -> Self {
        self.record.content = Some(body.to_string());
        self
    }

    pub fn email(mut self, address: &str) -> Self {
        self.record.emails.push(address.to_string());
        self
    }

    pub fn phone(mut self, number: &str) -> Self {
        self.record.phone_numbers.push(number.to_string());
        self
    }

    pub fn linkedin(mut self, url: &str) -> Self {
        self.record.linkedin_url = Some(url.to_string());
        self
    }

    pub fn build(self) -> ExtractedRecord {
        self.record
    }
}

/// 带作者、正文和一个邮箱的常用记录
pub fn record(id: i64) -> ExtractedRecord {
    RecordBuilder::new(id)
        .author(&format!("author-{id}"))
        .content("<p>hello</p>")
        .email(&format!("a{id}@example.com"))
        .build()
}

/// 把记录打包成分块载荷
pub fn chunk_payload(records: Vec<ExtractedRecord>) -> ChunkPayload {
    ChunkPayload {
        records,
        size_in_mb: 0.0,
    }
}
