pub mod config;
pub mod logging;
pub mod pipeline;

pub use config::{Config, LogLevel};
pub use pipeline::Pipeline;

use crate::domain::EngineError;
use crate::metadata::{FetcherConfig, HttpMetadataFetcher, IdentityOverrides, MetadataResolver};
use crate::sender::{AuthClientConfig, Dispatcher, GoogleAuthClient};
use crate::transform::RecordTransformer;
use std::sync::Arc;
use tracing::info;

pub async fn main() -> Result<(), EngineError> {
    let config = Config::load()?;
    logging::setup_logging(config.log_level)?;
    run(config).await
}

pub async fn run(config: Config) -> Result<(), EngineError> {
    config.validate()?;
    let label_map = config.parsed_label_map()?;

    let fetcher = HttpMetadataFetcher::new(FetcherConfig::default())?;
    let overrides = IdentityOverrides {
        project_id: config.project_id.clone(),
        zone: config.zone.clone(),
        vm_id: config.vm_id.clone(),
    };
    let identity = MetadataResolver::new(fetcher)
        .resolve(config.use_metadata_service, &overrides)
        .await?;
    let identity = Arc::new(identity);

    let transformer = RecordTransformer::new(identity.clone(), label_map);
    let client = GoogleAuthClient::new(AuthClientConfig::default())?;
    let dispatcher = Dispatcher::new(client, identity, transformer, config.endpoint.clone());

    info!(version = crate::VERSION, "starting log dispatch pipeline");
    Pipeline::new(dispatcher, &config).run().await?;
    Ok(())
}
