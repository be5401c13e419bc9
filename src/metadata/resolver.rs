use super::fetch::{MetadataError, MetadataFetcher};
use super::identity::{
    APPENGINE_SERVICE, COMPUTE_SERVICE, DATAFLOW_SERVICE, EC2_SERVICE, Identity, Platform,
};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

/// Fatal startup errors: the process must not start without a complete
/// identity.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to obtain metadata parameters: {}", missing.join(" "))]
    MissingIdentity { missing: Vec<&'static str> },
    #[error("Metadata fetch failed: {0}")]
    Fetch(#[from] MetadataError),
}

/// Identity fields supplied through configuration. An override always wins
/// over the metadata service and skips the corresponding fetch.
#[derive(Debug, Clone, Default)]
pub struct IdentityOverrides {
    pub project_id: Option<String>,
    pub zone: Option<String>,
    pub vm_id: Option<String>,
}

/// Resolves the host identity once at startup, using an injected
/// metadata-fetch capability.
pub struct MetadataResolver<F> {
    fetcher: F,
}

impl<F: MetadataFetcher> MetadataResolver<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub async fn resolve(
        &self,
        use_metadata_service: bool,
        overrides: &IdentityOverrides,
    ) -> Result<Identity, ConfigError> {
        let platform = if use_metadata_service {
            self.fetcher.probe().await
        } else {
            Platform::Other
        };
        debug!(?platform, "determined host platform");

        let mut project_id = overrides.project_id.clone();
        let mut zone = overrides.zone.clone();
        let mut vm_id = overrides.vm_id.clone();
        let mut common_labels = BTreeMap::new();

        match platform {
            Platform::Gce => {
                if project_id.is_none() {
                    project_id = Some(self.fetcher.fetch_gce("project/project-id").await?);
                }
                if zone.is_none() {
                    // Served as projects/<number>/zones/<zone>; keep the leaf.
                    let full_zone = self.fetcher.fetch_gce("instance/zone").await?;
                    zone = Some(
                        full_zone
                            .rsplit('/')
                            .next()
                            .unwrap_or(full_zone.as_str())
                            .to_string(),
                    );
                }
                if vm_id.is_none() {
                    vm_id = Some(self.fetcher.fetch_gce("instance/id").await?);
                }
            }
            Platform::Ec2 => {
                if zone.is_none() || vm_id.is_none() {
                    let document = self.fetcher.fetch_ec2_identity().await?;
                    if zone.is_none() {
                        zone = Some(format!("aws:{}", document.availability_zone));
                    }
                    if vm_id.is_none() {
                        vm_id = Some(document.instance_id);
                    }
                    if let Some(account_id) = document.account_id {
                        common_labels.insert(format!("{EC2_SERVICE}/account_id"), account_id);
                    }
                }
            }
            Platform::Other => {}
        }

        let mut missing = Vec::new();
        let project_id = required_field(project_id, "project_id", &mut missing);
        let zone = required_field(zone, "zone", &mut missing);
        let vm_id = required_field(vm_id, "vm_id", &mut missing);
        if !missing.is_empty() {
            return Err(ConfigError::MissingIdentity { missing });
        }

        let mut service_name = COMPUTE_SERVICE.to_string();
        let mut running_on_managed_vm = false;
        let mut app_backend_name = None;
        let mut app_backend_version = None;

        match platform {
            Platform::Gce => {
                let attributes = self.gce_attribute_keys().await?;
                let has = |key: &str| attributes.iter().any(|a| a == key);

                if has("gae_backend_name") && has("gae_backend_version") {
                    // Managed app-engine environment: module/version labels
                    // replace the generic compute labels.
                    running_on_managed_vm = true;
                    service_name = APPENGINE_SERVICE.to_string();
                    let backend_name = self
                        .fetcher
                        .fetch_gce("instance/attributes/gae_backend_name")
                        .await?;
                    let backend_version = self
                        .fetcher
                        .fetch_gce("instance/attributes/gae_backend_version")
                        .await?;
                    common_labels.insert(
                        format!("{APPENGINE_SERVICE}/module_id"),
                        backend_name.clone(),
                    );
                    common_labels.insert(
                        format!("{APPENGINE_SERVICE}/version_id"),
                        backend_version.clone(),
                    );
                    app_backend_name = Some(backend_name);
                    app_backend_version = Some(backend_version);
                } else if has("job_id") {
                    service_name = DATAFLOW_SERVICE.to_string();
                    let job_id = self.fetcher.fetch_gce("instance/attributes/job_id").await?;
                    common_labels.insert(format!("{DATAFLOW_SERVICE}/job_id"), job_id);
                } else {
                    insert_resource_labels(&mut common_labels, COMPUTE_SERVICE, &vm_id);
                }
            }
            Platform::Ec2 => {
                service_name = EC2_SERVICE.to_string();
                insert_resource_labels(&mut common_labels, EC2_SERVICE, &vm_id);
            }
            Platform::Other => {
                insert_resource_labels(&mut common_labels, COMPUTE_SERVICE, &vm_id);
            }
        }

        info!(
            ?platform,
            %project_id,
            %zone,
            %vm_id,
            %service_name,
            "resolved host identity"
        );

        Ok(Identity {
            platform,
            project_id,
            zone,
            vm_id,
            service_name,
            common_labels,
            running_on_managed_vm,
            app_backend_name,
            app_backend_version,
        })
    }

    async fn gce_attribute_keys(&self) -> Result<Vec<String>, ConfigError> {
        match self.fetcher.fetch_gce("instance/attributes/").await {
            Ok(listing) => Ok(listing.split_whitespace().map(str::to_string).collect()),
            // An instance without attributes serves no listing.
            Err(MetadataError::Status { status: 404, .. }) => Ok(Vec::new()),
            Err(error) => Err(error.into()),
        }
    }
}

fn required_field(
    value: Option<String>,
    name: &'static str,
    missing: &mut Vec<&'static str>,
) -> String {
    match value {
        Some(value) if !value.is_empty() => value,
        _ => {
            missing.push(name);
            String::new()
        }
    }
}

fn insert_resource_labels(labels: &mut BTreeMap<String, String>, service: &str, vm_id: &str) {
    labels.insert(format!("{service}/resource_type"), "instance".to_string());
    labels.insert(format!("{service}/resource_id"), vm_id.to_string());
}
