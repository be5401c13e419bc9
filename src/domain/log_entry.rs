use super::severity::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One decoded (tag, time, record) tuple as delivered by the host
/// framework's buffer.
///
/// `record` is dynamically typed; anything other than a JSON object is
/// skipped during transformation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogTuple {
    pub tag: String,
    pub time: i64,
    pub record: serde_json::Value,
}

/// Event time split into whole seconds and the nanosecond remainder, as the
/// backend's write API expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    pub service_name: String,
    pub project_id: String,
    pub zone: String,
    pub timestamp: Timestamp,
    pub severity: Severity,
    // Omitted entirely when no labels were extracted; the backend rejects
    // neither shape but an empty map is never sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

/// Entry payload: exactly one of the two variants is present on the wire.
#[derive(Debug, Clone, Serialize)]
pub enum Payload {
    #[serde(rename = "textPayload")]
    Text(String),
    #[serde(rename = "structPayload")]
    Struct(serde_json::Map<String, serde_json::Value>),
}

/// A fully transformed log entry ready for batching and transmission.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub metadata: EntryMetadata,
    #[serde(flatten)]
    pub payload: Payload,
}

/// Body of one `entries:write` call: all entries of one (chunk, tag) pair
/// plus the resource's common labels.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRequest {
    pub common_labels: BTreeMap<String, String>,
    pub entries: Vec<LogEntry>,
}
