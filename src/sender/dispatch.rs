use super::auth::{AuthenticatedClient, ClientError};
use super::classify::is_retriable_client_error;
use crate::domain::{LogEntry, LogTuple, WriteRequest};
use crate::metadata::Identity;
use crate::metadata::identity::APPENGINE_SERVICE;
use crate::transform::RecordTransformer;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_ENDPOINT: &str = "https://logging.googleapis.com";

/// Escape everything outside the URL-unreserved set, '/' included, so a tag
/// maps to a single path segment of the write URL.
const LOG_NAME_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Failure of a whole write call. Either kind tells the caller to re-deliver
/// the chunk; per-tag non-retriable failures are absorbed (logged and
/// dropped) and never surface here.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Retriable client error: {0}")]
    Client(String),
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Groups transformed entries by tag and writes one request per tag to the
/// logging backend, classifying failures into retriable vs. droppable.
///
/// One instance lives for the process lifetime and may be invoked
/// concurrently for different chunks; processing within a call is
/// sequential.
pub struct Dispatcher<C> {
    client: C,
    identity: Arc<Identity>,
    transformer: RecordTransformer,
    endpoint: String,
    first_success: AtomicBool,
}

impl<C: AuthenticatedClient> Dispatcher<C> {
    pub fn new(
        client: C,
        identity: Arc<Identity>,
        transformer: RecordTransformer,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client,
            identity,
            transformer,
            endpoint: endpoint.into(),
            first_success: AtomicBool::new(false),
        }
    }

    /// Writes one buffered chunk. An `Err` means the whole chunk should be
    /// re-delivered by the caller; tags already written before the failing
    /// one will then be sent again (at-least-once, no dedup).
    pub async fn write_chunk(&self, chunk: &[LogTuple]) -> Result<(), DispatchError> {
        for (tag, entries) in self.group_by_tag(chunk) {
            if entries.is_empty() {
                debug!(%tag, "no surviving entries for tag, skipping request");
                continue;
            }
            self.write_tag(&tag, entries).await?;
        }
        Ok(())
    }

    /// Transforms every tuple and groups the results by tag, preserving both
    /// first-appearance tag order and per-tag arrival order.
    fn group_by_tag(&self, chunk: &[LogTuple]) -> Vec<(String, Vec<LogEntry>)> {
        let mut groups: Vec<(String, Vec<LogEntry>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for tuple in chunk {
            let slot = *index.entry(tuple.tag.clone()).or_insert_with(|| {
                groups.push((tuple.tag.clone(), Vec::new()));
                groups.len() - 1
            });
            if let Some(entry) = self.transformer.transform(tuple.record.clone(), tuple.time) {
                groups[slot].1.push(entry);
            }
        }

        groups
    }

    async fn write_tag(&self, tag: &str, entries: Vec<LogEntry>) -> Result<(), DispatchError> {
        let entry_count = entries.len();
        let request = WriteRequest {
            common_labels: self.identity.common_labels.clone(),
            entries,
        };

        let body = match serde_json::to_string(&request) {
            Ok(body) => body,
            Err(error) => {
                warn!(
                    %tag,
                    dropped = entry_count,
                    %error,
                    "Dropping log entries: request could not be serialized"
                );
                return Ok(());
            }
        };

        let url = self.write_url(tag);
        match self.client.post_json(&url, body).await {
            Ok(()) => {
                if self
                    .first_success
                    .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    info!("Successfully sent to Google Cloud Logging API");
                }
                debug!(%tag, entries = entry_count, "wrote log entries");
                Ok(())
            }
            Err(ClientError::Request { status, message }) => {
                if is_retriable_client_error(&message) {
                    Err(DispatchError::Client(message))
                } else {
                    warn!(
                        %tag,
                        dropped = entry_count,
                        status,
                        %message,
                        "Dropping log entries rejected by the backend"
                    );
                    Ok(())
                }
            }
            Err(error) => Err(DispatchError::Transport(error.to_string())),
        }
    }

    fn write_url(&self, tag: &str) -> String {
        let log_name = if self.identity.running_on_managed_vm {
            format!("{APPENGINE_SERVICE}/{tag}")
        } else {
            tag.to_string()
        };
        format!(
            "{}/v1beta3/projects/{}/logs/{}/entries:write",
            self.endpoint,
            self.identity.project_id,
            utf8_percent_encode(&log_name, LOG_NAME_ESCAPE)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Platform;
    use serde_json::json;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeClient {
        calls: Mutex<Vec<(String, String)>>,
        responses: Mutex<VecDeque<Result<(), ClientError>>>,
    }

    impl FakeClient {
        fn respond_with(responses: Vec<Result<(), ClientError>>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                responses: Mutex::new(responses.into()),
            }
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl AuthenticatedClient for &FakeClient {
        async fn post_json(&self, url: &str, body: String) -> Result<(), ClientError> {
            self.calls.lock().unwrap().push((url.to_string(), body));
            self.responses.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    fn identity(running_on_managed_vm: bool) -> Arc<Identity> {
        Arc::new(Identity {
            platform: Platform::Gce,
            project_id: "my-project".to_string(),
            zone: "us-central1-a".to_string(),
            vm_id: "987654".to_string(),
            service_name: "compute.googleapis.com".to_string(),
            common_labels: BTreeMap::from([(
                "compute.googleapis.com/resource_id".to_string(),
                "987654".to_string(),
            )]),
            running_on_managed_vm,
            app_backend_name: None,
            app_backend_version: None,
        })
    }

    fn dispatcher(client: &FakeClient, managed_vm: bool) -> Dispatcher<&FakeClient> {
        let identity = identity(managed_vm);
        let transformer = RecordTransformer::new(identity.clone(), HashMap::new());
        Dispatcher::new(client, identity, transformer, "https://logging.example.com")
    }

    fn tuple(tag: &str, time: i64, record: serde_json::Value) -> LogTuple {
        LogTuple {
            tag: tag.to_string(),
            time,
            record,
        }
    }

    #[tokio::test]
    async fn one_request_per_tag_preserving_order() {
        let client = FakeClient::default();
        let dispatcher = dispatcher(&client, false);

        dispatcher
            .write_chunk(&[
                tuple("web", 1, json!({"message": "a"})),
                tuple("db", 2, json!({"message": "b"})),
                tuple("web", 3, json!({"message": "c"})),
            ])
            .await
            .unwrap();

        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].0.ends_with("/logs/web/entries:write"));
        assert!(calls[1].0.ends_with("/logs/db/entries:write"));

        let web_body: serde_json::Value = serde_json::from_str(&calls[0].1).unwrap();
        let entries = web_body["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["textPayload"], "a");
        assert_eq!(entries[1]["textPayload"], "c");
        assert_eq!(entries[0]["metadata"]["timestamp"]["seconds"], 1);
        assert_eq!(
            web_body["commonLabels"]["compute.googleapis.com/resource_id"],
            "987654"
        );
    }

    #[tokio::test]
    async fn tags_with_no_surviving_entries_make_no_request() {
        let client = FakeClient::default();
        let dispatcher = dispatcher(&client, false);

        dispatcher
            .write_chunk(&[
                tuple("junk", 1, json!("not a map")),
                tuple("good", 2, json!({"message": "ok"})),
            ])
            .await
            .unwrap();

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.contains("/logs/good/"));
    }

    #[tokio::test]
    async fn tag_is_url_escaped() {
        let client = FakeClient::default();
        let dispatcher = dispatcher(&client, false);

        dispatcher
            .write_chunk(&[tuple("app/test.log", 1, json!({"message": "m"}))])
            .await
            .unwrap();

        let calls = client.calls();
        assert!(
            calls[0].0.ends_with("/logs/app%2Ftest.log/entries:write"),
            "got {}",
            calls[0].0
        );
    }

    #[tokio::test]
    async fn managed_vm_prefixes_the_log_name() {
        let client = FakeClient::default();
        let dispatcher = dispatcher(&client, true);

        dispatcher
            .write_chunk(&[tuple("request", 1, json!({"message": "m"}))])
            .await
            .unwrap();

        let calls = client.calls();
        assert!(
            calls[0]
                .0
                .ends_with("/logs/appengine.googleapis.com%2Frequest/entries:write"),
            "got {}",
            calls[0].0
        );
    }

    #[tokio::test]
    async fn retriable_client_error_aborts_the_chunk() {
        let client = FakeClient::respond_with(vec![Err(ClientError::Request {
            status: 401,
            message: "Invalid Credentials".to_string(),
        })]);
        let dispatcher = dispatcher(&client, false);

        let error = dispatcher
            .write_chunk(&[
                tuple("first", 1, json!({"message": "a"})),
                tuple("second", 2, json!({"message": "b"})),
            ])
            .await
            .unwrap_err();

        assert!(matches!(error, DispatchError::Client(_)));
        // The failing tag aborts the remaining tags in the same call.
        assert_eq!(client.calls().len(), 1);
    }

    #[tokio::test]
    async fn non_retriable_client_error_drops_and_continues() {
        let client = FakeClient::respond_with(vec![
            Err(ClientError::Request {
                status: 429,
                message: "quota exceeded".to_string(),
            }),
            Ok(()),
        ]);
        let dispatcher = dispatcher(&client, false);

        dispatcher
            .write_chunk(&[
                tuple("first", 1, json!({"message": "a"})),
                tuple("second", 2, json!({"message": "b"})),
            ])
            .await
            .unwrap();

        // Both tags were attempted; the rejected one was dropped.
        assert_eq!(client.calls().len(), 2);
    }

    #[tokio::test]
    async fn transport_error_propagates() {
        let client = FakeClient::respond_with(vec![Err(ClientError::Transport(
            "connection reset".to_string(),
        ))]);
        let dispatcher = dispatcher(&client, false);

        let error = dispatcher
            .write_chunk(&[tuple("t", 1, json!({"message": "a"}))])
            .await
            .unwrap_err();

        assert!(matches!(error, DispatchError::Transport(_)));
    }

    #[tokio::test]
    async fn empty_chunk_is_a_no_op() {
        let client = FakeClient::default();
        let dispatcher = dispatcher(&client, false);
        dispatcher.write_chunk(&[]).await.unwrap();
        assert!(client.calls().is_empty());
    }
}
