use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Default token endpoint served by the GCE metadata service.
pub const DEFAULT_TOKEN_URL: &str =
    "http://169.254.169.254/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are renewed this many seconds before their reported expiry.
const TOKEN_RENEWAL_MARGIN_SECS: u64 = 60;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Client-side rejection by the backend; the message is matched against
    /// the retriable phrase set by the dispatcher.
    #[error("Request rejected by the backend ({status}): {message}")]
    Request { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Authenticated HTTP capability consumed by the dispatcher. Credential
/// acquisition and refresh are opaque to callers.
pub trait AuthenticatedClient: Send + Sync {
    fn post_json(
        &self,
        url: &str,
        body: String,
    ) -> impl std::future::Future<Output = Result<(), ClientError>> + Send;
}

#[derive(Debug, Clone)]
pub struct AuthClientConfig {
    pub token_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for AuthClientConfig {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_string(),
            timeout: Duration::from_secs(30),
            user_agent: format!("gcloud-log-dispatch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    renew_after: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// [`AuthenticatedClient`] backed by the metadata-service token endpoint.
///
/// The token is cached and renewed shortly before expiry; the cache is
/// guarded by an async mutex so concurrent dispatch calls can never observe
/// a torn update.
pub struct GoogleAuthClient {
    client: reqwest::Client,
    config: AuthClientConfig,
    token: Mutex<Option<CachedToken>>,
}

impl GoogleAuthClient {
    pub fn new(config: AuthClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                ClientError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            config,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, ClientError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Utc::now() < token.renew_after {
                return Ok(token.token.clone());
            }
        }

        let response = self
            .client
            .get(&self.config.token_url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| ClientError::Transport(format!("fetching access token: {e}")))?;

        if !response.status().is_success() {
            return Err(ClientError::Request {
                status: response.status().as_u16(),
                message: "Unable to fetch access token (no scopes configured?)".to_string(),
            });
        }

        let token_data: TokenResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Transport(format!("decoding access token: {e}")))?;

        let renew_after = Utc::now()
            + TimeDelta::seconds(
                token_data.expires_in.saturating_sub(TOKEN_RENEWAL_MARGIN_SECS) as i64,
            );
        debug!(%renew_after, "fetched new access token");
        *cached = Some(CachedToken {
            token: token_data.access_token.clone(),
            renew_after,
        });
        Ok(token_data.access_token)
    }
}

impl AuthenticatedClient for GoogleAuthClient {
    async fn post_json(&self, url: &str, body: String) -> Result<(), ClientError> {
        let token = self.access_token().await?;

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("could not decode body of HTTP error response: {e}"));
        let message = extract_error_message(&body);

        if status.is_client_error() {
            Err(ClientError::Request {
                status: status.as_u16(),
                message,
            })
        } else {
            // Server-side failures are indistinguishable from transient
            // outages; treated like transport errors.
            Err(ClientError::Transport(format!("HTTP {status}: {message}")))
        }
    }
}

/// Error bodies are JSON `{"error": {"message": ...}}` when the backend
/// produced them; anything else is surfaced verbatim.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}
