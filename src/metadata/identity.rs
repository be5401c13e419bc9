use serde::Serialize;
use std::collections::BTreeMap;

/// Service namespaces used for service names and label keys.
pub const APPENGINE_SERVICE: &str = "appengine.googleapis.com";
pub const COMPUTE_SERVICE: &str = "compute.googleapis.com";
pub const DATAFLOW_SERVICE: &str = "dataflow.googleapis.com";
pub const EC2_SERVICE: &str = "ec2.amazonaws.com";

/// Host platform as determined by the metadata-service probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Platform {
    Gce,
    Ec2,
    Other,
}

/// Immutable host identity, resolved once at startup and shared read-only
/// with the transformer and the dispatcher.
///
/// `project_id`, `zone` and `vm_id` are guaranteed non-empty; resolution
/// fails the startup otherwise.
#[derive(Debug, Clone)]
pub struct Identity {
    pub platform: Platform,
    pub project_id: String,
    pub zone: String,
    pub vm_id: String,
    pub service_name: String,
    pub common_labels: BTreeMap<String, String>,
    pub running_on_managed_vm: bool,
    pub app_backend_name: Option<String>,
    pub app_backend_version: Option<String>,
}
