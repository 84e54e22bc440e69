pub mod batch;
pub mod delivery;
pub mod dispatch;
pub mod record;

pub use batch::{BatchMetadata, BatchStatus, ChunkEnvelope, ChunkPayload};
pub use delivery::{DeliveryErrorKind, DeliveryStatus, EmailContent, OutgoingEmail};
pub use dispatch::{DispatchItem, DrainOutcome, DrainReport};
pub use record::{ExtractedRecord, RecordMessage};
