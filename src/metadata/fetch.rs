use super::identity::Platform;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Well-known link-local address served by both GCE and EC2.
pub const METADATA_SERVICE_ADDR: &str = "169.254.169.254";

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Request for {path} failed: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Request for {path} returned HTTP {status}")]
    Status { path: String, status: u16 },
    #[error("Malformed instance identity document: {0}")]
    Document(#[from] serde_json::Error),
}

/// The JSON document served by the EC2 metadata service at
/// `latest/dynamic/instance-identity/document`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ec2IdentityDocument {
    pub availability_zone: String,
    pub instance_id: String,
    #[serde(default)]
    pub account_id: Option<String>,
}

/// Capability for talking to the host's metadata service.
///
/// `probe` is best-effort and never fails; everything else propagates
/// transport errors, since by then the platform is known and a missing
/// required field is a hard failure.
pub trait MetadataFetcher: Send + Sync {
    /// Platform probe based on the response headers of the metadata root.
    fn probe(&self) -> impl std::future::Future<Output = Platform> + Send;

    /// GET a GCE metadata value, `path` relative to `computeMetadata/v1/`.
    fn fetch_gce(
        &self,
        path: &str,
    ) -> impl std::future::Future<Output = Result<String, MetadataError>> + Send;

    /// GET and decode the EC2 instance identity document.
    fn fetch_ec2_identity(
        &self,
    ) -> impl std::future::Future<Output = Result<Ec2IdentityDocument, MetadataError>> + Send;
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: format!("http://{METADATA_SERVICE_ADDR}"),
            timeout: Duration::from_secs(2),
        }
    }
}

/// HTTP implementation of [`MetadataFetcher`].
///
/// The base URL is configurable so tests can point it at a mock server.
#[derive(Debug, Clone)]
pub struct HttpMetadataFetcher {
    client: reqwest::Client,
    config: FetcherConfig,
}

impl HttpMetadataFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, MetadataError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                MetadataError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    async fn get_text(&self, path: &str, gce_flavor: bool) -> Result<String, MetadataError> {
        let url = format!("{}/{path}", self.config.base_url);
        let mut request = self.client.get(&url);
        if gce_flavor {
            request = request.header("Metadata-Flavor", "Google");
        }

        let response = request.send().await.map_err(|source| MetadataError::Request {
            path: path.to_string(),
            source,
        })?;

        if !response.status().is_success() {
            return Err(MetadataError::Status {
                path: path.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.text().await.map_err(|source| MetadataError::Request {
            path: path.to_string(),
            source,
        })
    }
}

impl MetadataFetcher for HttpMetadataFetcher {
    async fn probe(&self) -> Platform {
        let response = match self.client.get(format!("{}/", self.config.base_url)).send().await {
            Ok(response) => response,
            Err(error) => {
                debug!(%error, "metadata service probe failed, assuming no cloud platform");
                return Platform::Other;
            }
        };

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
        };

        if header("metadata-flavor") == Some("Google") {
            Platform::Gce
        } else if header("server") == Some("EC2ws") {
            // Heuristic: any server naming itself EC2ws is taken to be EC2.
            Platform::Ec2
        } else {
            Platform::Other
        }
    }

    async fn fetch_gce(&self, path: &str) -> Result<String, MetadataError> {
        self.get_text(&format!("computeMetadata/v1/{path}"), true).await
    }

    async fn fetch_ec2_identity(&self) -> Result<Ec2IdentityDocument, MetadataError> {
        let body = self
            .get_text("latest/dynamic/instance-identity/document", false)
            .await?;
        Ok(serde_json::from_str(&body)?)
    }
}
