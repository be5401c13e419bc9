use crate::domain::severity::normalize;
use crate::domain::{EntryMetadata, LogEntry, Payload, Severity, Timestamp};
use crate::metadata::Identity;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Converts one raw record into a backend log entry: timestamp resolution,
/// severity normalization, label extraction and payload shaping.
///
/// Lives for the process lifetime; safe to share across concurrent dispatch
/// calls. The deprecation warning for `timeNanos` fires at most once per
/// process (a racy double-fire is cosmetic).
pub struct RecordTransformer {
    identity: Arc<Identity>,
    label_map: HashMap<String, String>,
    time_nanos_warned: AtomicBool,
}

impl RecordTransformer {
    pub fn new(identity: Arc<Identity>, label_map: HashMap<String, String>) -> Self {
        Self {
            identity,
            label_map,
            time_nanos_warned: AtomicBool::new(false),
        }
    }

    /// Transforms a record, or returns `None` for records that are not maps.
    ///
    /// `fallback_time_secs` is the tuple's original event time, used when the
    /// record carries no timestamp fields of its own.
    pub fn transform(&self, record: Value, fallback_time_secs: i64) -> Option<LogEntry> {
        let Value::Object(mut record) = record else {
            debug!("skipping non-map record");
            return None;
        };

        let timestamp = self.resolve_timestamp(&mut record, fallback_time_secs);

        let severity = match record.remove("severity") {
            Some(Value::String(raw)) => normalize(&raw),
            Some(other) => normalize(&other.to_string()),
            None => Severity::default_level(),
        };

        let mut labels = BTreeMap::new();
        for (field, label) in &self.label_map {
            if let Some(value) = record.remove(field) {
                labels.insert(label.clone(), label_value(value));
            }
        }
        let labels = if labels.is_empty() { None } else { Some(labels) };

        let payload = match record.get("message") {
            Some(Value::String(message)) if record.len() == 1 => Payload::Text(message.clone()),
            _ => Payload::Struct(record),
        };

        Some(LogEntry {
            metadata: EntryMetadata {
                service_name: self.identity.service_name.clone(),
                project_id: self.identity.project_id.clone(),
                zone: self.identity.zone.clone(),
                timestamp,
                severity,
                labels,
            },
            payload,
        })
    }

    /// Timestamp sources in priority order, each consuming the fields it
    /// uses. A `timestamp` map only wins when it carries both parts.
    fn resolve_timestamp(
        &self,
        record: &mut serde_json::Map<String, Value>,
        fallback_time_secs: i64,
    ) -> Timestamp {
        let map_form = record
            .get("timestamp")
            .and_then(Value::as_object)
            .and_then(|ts| Some((to_i64(ts.get("seconds")?)?, to_i64(ts.get("nanos")?)?)));
        if let Some((seconds, nanos)) = map_form {
            record.remove("timestamp");
            return Timestamp {
                seconds,
                nanos: clamp_nanos(nanos),
            };
        }

        if record.contains_key("timestampSeconds") && record.contains_key("timestampNanos") {
            let seconds = record
                .remove("timestampSeconds")
                .and_then(|v| to_i64(&v))
                .unwrap_or(fallback_time_secs);
            let nanos = record
                .remove("timestampNanos")
                .and_then(|v| to_i64(&v))
                .unwrap_or(0);
            return Timestamp {
                seconds,
                nanos: clamp_nanos(nanos),
            };
        }

        if let Some(total_nanos) = record.get("timeNanos").and_then(to_i64) {
            record.remove("timeNanos");
            if self
                .time_nanos_warned
                .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                warn!(
                    "timeNanos is deprecated - please use timestampSeconds and timestampNanos instead"
                );
            }
            return Timestamp {
                seconds: total_nanos.div_euclid(NANOS_PER_SECOND),
                nanos: total_nanos.rem_euclid(NANOS_PER_SECOND) as i32,
            };
        }

        Timestamp {
            seconds: fallback_time_secs,
            nanos: 0,
        }
    }
}

/// Forces a nanosecond remainder into `[0, 999_999_999]`; values outside it
/// cannot be a remainder and would wrap the wire type.
fn clamp_nanos(nanos: i64) -> i32 {
    nanos.clamp(0, NANOS_PER_SECOND - 1) as i32
}

fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

fn label_value(value: Value) -> String {
    match value {
        Value::String(raw) => raw,
        other => other.to_string(),
    }
}
