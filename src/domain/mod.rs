pub mod error;
pub mod log_entry;
pub mod severity;

pub use error::EngineError;
pub use log_entry::{EntryMetadata, LogEntry, LogTuple, Payload, Timestamp, WriteRequest};
pub use severity::{Severity, normalize};
